//! Caller identity claims.
//!
//! `IdentityClaims` is the checkpoint-scoped view of a caller. `TokenClaims`
//! is its signed wire form inside a bearer token.

use serde::{Deserialize, Serialize};

use crate::auth::roles::{Role, RoleSet, UnknownRole};

/// Subject id used for the degraded identity on internal services.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Caller identity: subject id, display email, and roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub id: String,
    pub email: String,
    pub roles: RoleSet,
}

impl IdentityClaims {
    pub fn new(id: impl Into<String>, email: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            roles,
        }
    }

    /// Placeholder identity for requests that carry no verifiable credential.
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_SUBJECT, "", RoleSet::baseline())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,

    #[serde(default)]
    pub email: String,

    /// Role names; parsed against the closed role set after verification
    #[serde(default)]
    pub roles: Vec<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl TokenClaims {
    pub fn from_identity(claims: &IdentityClaims, iat: i64, exp: i64) -> Self {
        Self {
            sub: claims.id.clone(),
            email: claims.email.clone(),
            roles: claims.roles.names().into_iter().map(str::to_string).collect(),
            iat,
            exp,
        }
    }

    pub fn into_identity(self) -> Result<IdentityClaims, UnknownRole> {
        let roles = RoleSet::parse(&self.roles)?;
        Ok(IdentityClaims::new(self.sub, self.email, roles))
    }
}
