//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → matcher.rs (normalize path)
//!     → router.rs (longest-prefix upstream lookup)
//!     → Return: matched ServiceRoute or None
//!
//! Route Compilation (at startup):
//!     UpstreamConfig[]
//!     → Normalize prefixes
//!     → Sort by prefix length
//!     → Freeze as immutable ServiceRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{normalize_path, PathPattern};
pub use router::{ServiceRoute, ServiceRouter};
