//! Orders service: per-user projects.
//!
//! Mounted under `/api/v1/orders`. Admins and managers see every project;
//! other callers see and manage only their own.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::internal::{internal_auth, CallerIdentity, InternalAuth};
use crate::auth::roles::{authorize_owner, Role, RoleRequirement};
use crate::http::response::{ApiError, ApiResponse};
use crate::services::store::{Project, ProjectStore};

pub const PREFIX: &str = "/api/v1/orders";

const MAX_NAME_LEN: usize = 200;

#[derive(Clone)]
pub struct OrdersState {
    pub store: Arc<dyn ProjectStore>,
}

pub fn router(state: OrdersState, internal: Arc<InternalAuth>) -> Router {
    Router::new().nest(
        PREFIX,
        Router::new()
            .route("/projects", get(list_projects).post(create_project))
            .route("/projects/{id}", get(get_project).delete(delete_project))
            .route_layer(middleware::from_fn_with_state(internal, internal_auth))
            .with_state(state),
    )
}

/// Roles that may read any project.
fn read_override() -> RoleRequirement {
    RoleRequirement::any_of([Role::Admin, Role::Manager])
}

/// Roles that may delete any project.
fn delete_override() -> RoleRequirement {
    RoleRequirement::any_of([Role::Admin])
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

async fn list_projects(
    State(state): State<OrdersState>,
    caller: CallerIdentity,
) -> Result<ApiResponse<Vec<Project>>, ApiError> {
    let projects = if read_override().intersects(&caller.claims.roles) {
        state.store.list().await?
    } else {
        state.store.list_by_owner(&caller.claims.id).await?
    };
    Ok(ApiResponse::ok(projects))
}

async fn create_project(
    State(state): State<OrdersState>,
    caller: CallerIdentity,
    payload: Result<Json<CreateProject>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Project name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "Project name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }

    let project = Project {
        id: Uuid::new_v4().to_string(),
        owner_id: caller.claims.id.clone(),
        name: name.to_string(),
        description: req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        created_at: Utc::now(),
    };
    let project = state.store.insert(project).await?;

    tracing::info!(
        project_id = %project.id,
        owner_id = %project.owner_id,
        source = caller.source.as_str(),
        "Project created"
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(project)))
}

async fn get_project(
    State(state): State<OrdersState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<ApiResponse<Project>, ApiError> {
    let project = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project", &id))?;

    authorize_owner(&caller.claims, &project, &read_override())?;
    Ok(ApiResponse::ok(project))
}

async fn delete_project(
    State(state): State<OrdersState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    let project = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project", &id))?;

    authorize_owner(&caller.claims, &project, &delete_override())?;
    let deleted = state.store.delete(&id).await?;

    tracing::info!(project_id = %id, user_id = %caller.claims.id, "Project deleted");
    Ok(ApiResponse::ok(Deleted { id, deleted }))
}
