//! Internal re-authentication.
//!
//! Each internal service decides for itself who the caller is. Strategies are
//! tried in order and the first success wins:
//!
//! 1. Propagated `x-user-*` headers from the gateway
//! 2. A bearer token verified with the shared secret
//! 3. The fallback policy: the anonymous placeholder, or a hard 401
//!
//! Headers win over a token sent alongside them, even an invalid one.
//! Malformed headers are logged and treated as absent.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::claims::IdentityClaims;
use crate::auth::propagation;
use crate::auth::token::{bearer_token, TokenCodec, TokenError};
use crate::config::schema::FallbackPolicy;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Where the caller identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    Propagated,
    Token,
    Anonymous,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagated => "propagated",
            Self::Token => "token",
            Self::Anonymous => "anonymous",
        }
    }
}

/// Identity resolved by an internal service for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub claims: IdentityClaims,
    pub source: IdentitySource,
}

impl CallerIdentity {
    pub fn is_anonymous(&self) -> bool {
        self.source == IdentitySource::Anonymous
    }
}

/// Re-authenticator shared by an internal service's requests.
#[derive(Debug)]
pub struct InternalAuth {
    codec: Arc<TokenCodec>,
    fallback: FallbackPolicy,
}

impl InternalAuth {
    pub fn new(codec: Arc<TokenCodec>, fallback: FallbackPolicy) -> Self {
        Self { codec, fallback }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Result<CallerIdentity, ApiError> {
        match propagation::extract(headers) {
            Some(Ok(claims)) => {
                return Ok(CallerIdentity {
                    claims,
                    source: IdentitySource::Propagated,
                })
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Ignoring malformed identity headers");
            }
            None => {}
        }

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        let mut token_error: Option<TokenError> = None;
        if let Some(token) = token {
            match self.codec.verify(token) {
                Ok(claims) => {
                    return Ok(CallerIdentity {
                        claims,
                        source: IdentitySource::Token,
                    })
                }
                Err(err) => {
                    tracing::debug!(reason = err.reason(), "Bearer token rejected");
                    token_error = Some(err);
                }
            }
        }

        match self.fallback {
            FallbackPolicy::Anonymous => Ok(CallerIdentity {
                claims: IdentityClaims::anonymous(),
                source: IdentitySource::Anonymous,
            }),
            FallbackPolicy::Deny => Err(token_error.map_or(ApiError::TokenRequired, ApiError::from)),
        }
    }
}

/// Axum middleware that resolves the caller and stores a [`CallerIdentity`].
pub async fn internal_auth(
    State(auth): State<Arc<InternalAuth>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match auth.resolve(request.headers()) {
        Ok(caller) => {
            metrics::record_identity_source(caller.source.as_str());
            tracing::debug!(
                user_id = %caller.claims.id,
                source = caller.source.as_str(),
                "Caller resolved"
            );
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| ApiError::internal("internal auth layer not installed"))
    }
}
