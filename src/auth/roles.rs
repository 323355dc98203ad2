//! Roles and the role gate.
//!
//! Closed RBAC model with three roles. Unknown role names are rejected at
//! every parse site (token payload, propagated headers, config, registration).
//!
//! # Roles
//!
//! - `User` - baseline role every authenticated caller has at minimum
//! - `Manager` - sees and manages other users' projects
//! - `Admin` - administrative listings and overrides
//!
//! The same [`authorize`] call is used by the edge role rules and by the
//! internal service handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::claims::IdentityClaims;
use crate::http::response::ApiError;

/// Coarse-grained permission tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
    Admin,
}

/// A role name outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    /// The role every caller holds when nothing else is known.
    pub const BASELINE: Role = Role::User;

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated, never-empty set of roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    /// Build a set, keeping first-seen order. An empty input yields the
    /// baseline role.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut out: Vec<Role> = Vec::new();
        for role in roles {
            if !out.contains(&role) {
                out.push(role);
            }
        }
        if out.is_empty() {
            out.push(Role::BASELINE);
        }
        Self(out)
    }

    pub fn baseline() -> Self {
        Self(vec![Role::BASELINE])
    }

    /// Parse role names, rejecting the whole set on the first unknown name.
    pub fn parse<I, S>(names: I) -> Result<Self, UnknownRole>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roles = names
            .into_iter()
            .map(|name| name.as_ref().parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(roles))
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Role] {
        &self.0
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(Role::as_str).collect()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        Self::new(roles)
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.0
    }
}

/// Roles attached to a route. Satisfied when empty or when it shares at least
/// one role with the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRequirement(Vec<Role>);

impl RoleRequirement {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }

    /// True if the caller holds at least one of the listed roles.
    /// Unlike [`allowed`], an empty requirement grants nothing here.
    pub fn intersects(&self, roles: &RoleSet) -> bool {
        self.0.iter().any(|r| roles.contains(*r))
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// The role gate.
pub fn allowed(claim_roles: &RoleSet, required: &RoleRequirement) -> bool {
    required.is_empty() || required.intersects(claim_roles)
}

/// Role gate with the uniform `FORBIDDEN` denial.
pub fn authorize(claims: &IdentityClaims, required: &RoleRequirement) -> Result<(), ApiError> {
    if allowed(&claims.roles, required) {
        Ok(())
    } else {
        tracing::info!(
            user_id = %claims.id,
            required = %required,
            "Role requirement not met"
        );
        Err(ApiError::forbidden(format!("Requires role: {}", required)))
    }
}

/// Resources that belong to a single caller.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

/// Ownership predicate: the caller owns the resource, or holds one of the
/// override roles.
pub fn authorize_owner<R: Owned + ?Sized>(
    claims: &IdentityClaims,
    resource: &R,
    override_roles: &RoleRequirement,
) -> Result<(), ApiError> {
    if resource.owner_id() == claims.id || override_roles.intersects(&claims.roles) {
        Ok(())
    } else {
        tracing::info!(user_id = %claims.id, "Ownership check failed");
        Err(ApiError::forbidden("Not the owner of this resource"))
    }
}
