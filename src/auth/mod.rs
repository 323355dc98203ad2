//! Identity and authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway:
//!     bearer token
//!     → token.rs (verify signature, then expiry)
//!     → edge.rs (public allow-list, edge role rules)
//!     → propagation.rs (x-user-* headers on the forwarded request)
//!
//! Internal service:
//!     x-user-* headers | bearer token | nothing
//!     → internal.rs (CallerIdentity with its source)
//!     → roles.rs (role gate, ownership)
//! ```
//!
//! # Design Decisions
//! - One shared HS256 secret; every checkpoint can verify independently
//! - Roles are a closed set; unknown names never reach a decision
//! - Claims are rebuilt at each checkpoint, never mutated downstream

pub mod claims;
pub mod edge;
pub mod internal;
pub mod propagation;
pub mod roles;
pub mod token;

pub use claims::IdentityClaims;
pub use internal::{CallerIdentity, IdentitySource};
pub use roles::{Role, RoleRequirement, RoleSet};
pub use token::{TokenCodec, TokenError};
