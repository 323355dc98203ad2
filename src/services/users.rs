//! Users service: registration, login and identity lookup.
//!
//! Mounted under `/api/v1/users`. Register and login are public at the
//! gateway, which forwards them without identity, so they resolve the caller
//! with the anonymous fallback whatever the configured policy. Everything
//! else runs behind the configured internal re-authentication.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::IdentityClaims;
use crate::auth::internal::{internal_auth, CallerIdentity, IdentitySource, InternalAuth};
use crate::auth::roles::{authorize, Role, RoleRequirement, RoleSet};
use crate::auth::token::TokenCodec;
use crate::config::FallbackPolicy;
use crate::http::response::{ApiError, ApiResponse};
use crate::services::store::{User, UserStore};

pub const PREFIX: &str = "/api/v1/users";

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct UsersState {
    pub store: Arc<dyn UserStore>,
    pub codec: Arc<TokenCodec>,
    pub token_ttl: chrono::Duration,
}

pub fn router(state: UsersState, internal: Arc<InternalAuth>) -> Router {
    let protected = Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(internal, internal_auth));

    let open_auth = Arc::new(InternalAuth::new(
        state.codec.clone(),
        FallbackPolicy::Anonymous,
    ));
    let open = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route_layer(middleware::from_fn_with_state(open_auth, internal_auth));

    Router::new().nest(PREFIX, protected.merge(open).with_state(state))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub roles: RoleSet,
    pub source: IdentitySource,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::validation("A valid email address is required"))
    }
}

/// Argon2id in PHC format. CPU-bound, so it runs off the async workers.
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::internal(format!("password hash failed: {}", e)))
    })
    .await
    .map_err(|e| ApiError::internal(format!("hash task failed: {}", e)))?
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| ApiError::internal(format!("invalid password hash: {}", e)))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::internal(format!("password verification failed: {}", e))),
        }
    })
    .await
    .map_err(|e| ApiError::internal(format!("verify task failed: {}", e)))?
}

async fn register(
    State(state): State<UsersState>,
    caller: CallerIdentity,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let roles = RoleSet::parse(&req.roles).map_err(|e| ApiError::validation(e.to_string()))?;
    if roles.contains(Role::Admin) && !caller.claims.has_role(Role::Admin) {
        tracing::warn!(email = %email, "Refused self-assigned admin role");
        return Err(ApiError::forbidden("Only an admin can grant the admin role"));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: hash_password(req.password).await?,
        roles,
        created_at: Utc::now(),
    };
    let user = state.store.insert(user).await?;

    tracing::info!(user_id = %user.id, roles = ?user.roles.names(), "User registered");
    Ok((StatusCode::CREATED, ApiResponse::ok(user)))
}

async fn login(
    State(state): State<UsersState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let Some(user) = state.store.find_by_email(req.email.trim()).await? else {
        tracing::info!("Login failed: unknown email");
        return Err(ApiError::InvalidCredentials);
    };
    if !verify_password(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let claims = IdentityClaims::new(user.id.clone(), user.email.clone(), user.roles.clone());
    let token = state.codec.issue(&claims, state.token_ttl)?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiResponse::ok(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: state.token_ttl.num_seconds(),
        user,
    }))
}

async fn me(caller: CallerIdentity) -> ApiResponse<MeResponse> {
    ApiResponse::ok(MeResponse {
        id: caller.claims.id,
        email: caller.claims.email,
        roles: caller.claims.roles,
        source: caller.source,
    })
}

async fn list_users(
    State(state): State<UsersState>,
    caller: CallerIdentity,
) -> Result<ApiResponse<Vec<User>>, ApiError> {
    authorize(&caller.claims, &RoleRequirement::any_of([Role::Admin]))?;
    Ok(ApiResponse::ok(state.store.list().await?))
}
