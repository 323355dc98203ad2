//! Edge authentication.
//!
//! Runs on the gateway for every inbound request:
//!
//! ```text
//! normalize path
//!     → public route?            → Bypassed (forwarded without identity)
//!     → no bearer token?         → TOKEN_REQUIRED
//!     → token fails to verify?   → INVALID_TOKEN | TOKEN_EXPIRED
//!     → edge role rule unmet?    → FORBIDDEN
//!     → Authenticated (claims stored in request extensions)
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::claims::IdentityClaims;
use crate::auth::roles::{authorize, RoleRequirement, RoleSet, UnknownRole};
use crate::auth::token::{bearer_token, TokenCodec, TokenError};
use crate::config::schema::{EdgeConfig, PathRule};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::routing::matcher::{normalize_path, PathPattern};

/// Allow-list of routes that skip authentication.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    patterns: Vec<PathPattern>,
}

impl PublicRoutes {
    pub fn new(rules: &[PathRule]) -> Self {
        Self {
            patterns: rules.iter().map(PathPattern::from).collect(),
        }
    }

    /// `path` must already be normalized.
    pub fn is_public(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Role requirement bound to a path pattern.
#[derive(Debug, Clone)]
pub struct RoleRule {
    pattern: PathPattern,
    required: RoleRequirement,
}

/// Outcome of a successful edge check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    Bypassed,
    Authenticated(IdentityClaims),
}

/// Edge authenticator shared by all gateway requests.
#[derive(Debug)]
pub struct EdgeAuth {
    codec: Arc<TokenCodec>,
    public: PublicRoutes,
    role_rules: Vec<RoleRule>,
}

impl EdgeAuth {
    pub fn new(codec: Arc<TokenCodec>, config: &EdgeConfig) -> Result<Self, UnknownRole> {
        let role_rules = config
            .role_rules
            .iter()
            .map(|rule| {
                let roles = RoleSet::parse(&rule.roles)?;
                Ok(RoleRule {
                    pattern: PathPattern::new(&rule.path, rule.kind),
                    required: RoleRequirement::any_of(roles.iter().copied()),
                })
            })
            .collect::<Result<Vec<_>, UnknownRole>>()?;

        Ok(Self {
            codec,
            public: PublicRoutes::new(&config.public_routes),
            role_rules,
        })
    }

    /// Decide one request. `path` is the raw request path.
    pub fn authenticate(&self, path: &str, headers: &HeaderMap) -> Result<EdgeDecision, ApiError> {
        let path = normalize_path(path);
        if self.public.is_public(&path) {
            return Ok(EdgeDecision::Bypassed);
        }

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        let Some(token) = token else {
            tracing::info!(path = %path, "Missing bearer token");
            metrics::record_auth_failure("missing_token");
            return Err(ApiError::TokenRequired);
        };

        let claims = self.codec.verify(token).map_err(|err| {
            match &err {
                TokenError::Expired => tracing::info!(path = %path, "Expired token rejected"),
                other => tracing::warn!(path = %path, error = %other, "Invalid token rejected"),
            }
            metrics::record_auth_failure(err.reason());
            ApiError::from(err)
        })?;

        for rule in self.role_rules.iter().filter(|r| r.pattern.matches(&path)) {
            authorize(&claims, &rule.required).inspect_err(|_| {
                metrics::record_auth_failure("forbidden");
            })?;
        }

        Ok(EdgeDecision::Authenticated(claims))
    }
}

/// Axum middleware wrapping [`EdgeAuth::authenticate`].
pub async fn edge_auth(
    State(auth): State<Arc<EdgeAuth>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match auth.authenticate(request.uri().path(), request.headers()) {
        Ok(EdgeDecision::Authenticated(claims)) => {
            tracing::debug!(user_id = %claims.id, "Caller authenticated");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Ok(EdgeDecision::Bypassed) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
