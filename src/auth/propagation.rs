//! Identity propagation headers.
//!
//! The gateway encodes the verified claim set into `x-user-*` headers on the
//! forwarded request. Internal services read them back. These headers are only
//! meaningful on the internal network segment, so the gateway strips any
//! client-supplied copies before forwarding.

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::auth::claims::IdentityClaims;
use crate::auth::roles::RoleSet;
use crate::http::request::{RequestId, X_REQUEST_ID};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_ROLES: HeaderName = HeaderName::from_static("x-user-roles");

const IDENTITY_HEADERS: [HeaderName; 3] = [X_USER_ID, X_USER_EMAIL, X_USER_ROLES];

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("header '{0}' is not valid UTF-8")]
    InvalidEncoding(&'static str),

    #[error("x-user-roles is not a JSON array of known roles: {0}")]
    InvalidRoles(String),

    #[error("claim '{0}' cannot be encoded as a header value")]
    Unencodable(&'static str),
}

/// Remove identity headers and credentials a client may have sent.
pub fn strip(headers: &mut HeaderMap) {
    for name in &IDENTITY_HEADERS {
        headers.remove(name);
    }
    headers.remove(AUTHORIZATION);
}

/// Replace any identity headers with `claims` and set the correlation id.
/// The bearer token is not forwarded.
pub fn inject(
    headers: &mut HeaderMap,
    claims: &IdentityClaims,
    request_id: &RequestId,
) -> Result<(), PropagationError> {
    strip(headers);

    let id = HeaderValue::from_str(&claims.id).map_err(|_| PropagationError::Unencodable("id"))?;
    let email =
        HeaderValue::from_str(&claims.email).map_err(|_| PropagationError::Unencodable("email"))?;
    let roles = serde_json::to_string(&claims.roles)
        .ok()
        .and_then(|json| HeaderValue::from_str(&json).ok())
        .ok_or(PropagationError::Unencodable("roles"))?;

    headers.insert(X_USER_ID, id);
    headers.insert(X_USER_EMAIL, email);
    headers.insert(X_USER_ROLES, roles);
    headers.insert(X_REQUEST_ID, request_id.header_value());
    Ok(())
}

/// Read propagated identity back.
///
/// Returns `None` when `x-user-id` is absent or blank, so the caller can move
/// on to other strategies. A missing email reads as empty and missing roles
/// as the baseline role.
pub fn extract(headers: &HeaderMap) -> Option<Result<IdentityClaims, PropagationError>> {
    let id = match headers.get(&X_USER_ID) {
        None => return None,
        Some(value) => match utf8(value) {
            Ok(id) if id.trim().is_empty() => return None,
            Ok(id) => id.to_string(),
            Err(_) => return Some(Err(PropagationError::InvalidEncoding("x-user-id"))),
        },
    };

    Some(parse_rest(headers, id))
}

fn parse_rest(headers: &HeaderMap, id: String) -> Result<IdentityClaims, PropagationError> {
    let email = match headers.get(&X_USER_EMAIL) {
        None => String::new(),
        Some(value) => utf8(value)
            .map_err(|_| PropagationError::InvalidEncoding("x-user-email"))?
            .to_string(),
    };

    let roles = match headers.get(&X_USER_ROLES) {
        None => RoleSet::baseline(),
        Some(value) => {
            let raw =
                utf8(value).map_err(|_| PropagationError::InvalidEncoding("x-user-roles"))?;
            serde_json::from_str::<RoleSet>(raw)
                .map_err(|e| PropagationError::InvalidRoles(e.to_string()))?
        }
    };

    Ok(IdentityClaims::new(id, email, roles))
}

/// `HeaderValue::to_str` only admits visible ASCII; `inject` writes claims
/// as raw UTF-8, so read them back the same way.
fn utf8(value: &HeaderValue) -> Result<&str, std::str::Utf8Error> {
    std::str::from_utf8(value.as_bytes())
}
