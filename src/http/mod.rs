//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, request span)
//!     → [edge authentication]
//!     → proxy.rs (route, rewrite, forward, relay)
//!     → response.rs (error and success envelopes)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use response::{ApiError, ApiResponse, ErrorKind};
pub use server::HttpServer;
