//! Storage for the internal services.
//!
//! Handlers depend on the [`UserStore`] and [`ProjectStore`] traits, never on
//! a concrete backend. The in-memory implementations keep everything in
//! `DashMap`s and are what the binary and the tests run with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use thiserror::Error;

use crate::auth::roles::{Owned, RoleSet};
use crate::http::response::ApiError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Backend(msg) => ApiError::internal(msg),
        }
    }
}

/// Registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
}

/// A project owned by one user.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Owned for Project {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Emails are unique, compared case-insensitively.
    async fn insert(&self, user: User) -> Result<User, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert(&self, project: Project) -> Result<Project, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError>;

    async fn list(&self) -> Result<Vec<Project>, StoreError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Project>, StoreError>;

    /// Returns whether a project was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
    /// Lowercased email → user id.
    by_email: DashMap<String, String>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, StoreError> {
        match self.by_email.entry(user.email.to_lowercase()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: "user",
                key: user.email,
            }),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.clone());
                Ok(user)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = match self.by_email.get(&email.to_lowercase()) {
            Some(id) => id.value().clone(),
            None => return Ok(None),
        };
        self.get(&id).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: DashMap<String, Project>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut projects: Vec<Project>) -> Vec<Project> {
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        projects
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn insert(&self, project: Project) -> Result<Project, StoreError> {
        match self.projects.entry(project.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: "project",
                key: project.id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(project.clone());
                Ok(project)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(id).map(|p| p.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Project>, StoreError> {
        Ok(Self::sorted(
            self.projects.iter().map(|p| p.value().clone()).collect(),
        ))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Project>, StoreError> {
        Ok(Self::sorted(
            self.projects
                .iter()
                .filter(|p| p.owner_id == owner_id)
                .map(|p| p.value().clone())
                .collect(),
        ))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.projects.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.into(),
            email: email.into(),
            password_hash: "hash".into(),
            roles: RoleSet::baseline(),
            created_at: Utc::now(),
        }
    }

    fn project(id: &str, owner: &str) -> Project {
        Project {
            id: id.into(),
            owner_id: owner.into(),
            name: format!("project {}", id),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_user_email_is_unique_case_insensitive() {
        let store = InMemoryUserStore::new();
        store.insert(user("u1", "a@b.com")).await.unwrap();

        let err = store.insert(user("u2", "A@B.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "user", .. }));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let store = InMemoryUserStore::new();
        store.insert(user("u1", "a@b.com")).await.unwrap();

        assert_eq!(store.find_by_email("A@b.com").await.unwrap().unwrap().id, "u1");
        assert!(store.find_by_email("x@y.z").await.unwrap().is_none());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(user("u1", "a@b.com")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["roles"], serde_json::json!(["user"]));
    }

    #[tokio::test]
    async fn test_projects_by_owner_and_delete() {
        let store = InMemoryProjectStore::new();
        store.insert(project("p1", "u1")).await.unwrap();
        store.insert(project("p2", "u2")).await.unwrap();
        store.insert(project("p3", "u1")).await.unwrap();

        let mine: Vec<String> = store
            .list_by_owner("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|id| id != "p2"));
        assert_eq!(store.list().await.unwrap().len(), 3);

        assert!(store.delete("p1").await.unwrap());
        assert!(!store.delete("p1").await.unwrap());
        assert!(store.get("p1").await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let err: ApiError = StoreError::Duplicate {
            entity: "user",
            key: "a@b.com".into(),
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
