//! Bearer token codec.
//!
//! HS256 JWTs signed with the secret shared by the gateway and every internal
//! service. Verification distinguishes a bad signature, an expired token and
//! a token that cannot be parsed, so callers can respond to each differently.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use thiserror::Error;

use crate::auth::claims::{IdentityClaims, TokenClaims};
use crate::http::response::{ApiError, ErrorKind};

/// Minimum shared-secret length for HS256.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Wire error kind for a verification failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired => ErrorKind::TokenExpired,
            Self::InvalidSignature | Self::Malformed(_) => ErrorKind::InvalidToken,
            Self::WeakSecret | Self::Signing(_) => ErrorKind::InternalError,
        }
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::Malformed(_) => "malformed",
            Self::WeakSecret => "weak_secret",
            Self::Signing(_) => "signing",
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::InvalidSignature | TokenError::Malformed(_) => {
                ApiError::InvalidToken(err.to_string())
            }
            TokenError::WeakSecret | TokenError::Signing(_) => ApiError::internal(err.to_string()),
        }
    }
}

/// Issues and verifies bearer tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &"HS256")
            .finish()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign `claims` valid from now for `ttl`.
    pub fn issue(&self, claims: &IdentityClaims, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(claims, Utc::now(), ttl)
    }

    /// Sign `claims` with an explicit issue time.
    pub fn issue_at(
        &self,
        claims: &IdentityClaims,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let iat = issued_at.timestamp();
        let exp = (issued_at + ttl).timestamp();
        let payload = TokenClaims::from_identity(claims, iat, exp);

        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, then rebuild the claim set.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                JwtErrorKind::InvalidSignature => TokenError::InvalidSignature,
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        data.claims
            .into_identity()
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` value.
/// Returns `None` for other schemes or an empty token.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::{Role, RoleSet};

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!!";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET).unwrap()
    }

    fn manager() -> IdentityClaims {
        IdentityClaims::new("u1", "a@b.com", RoleSet::new([Role::Manager]))
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let token = codec.issue(&manager(), Duration::hours(1)).unwrap();
        assert_eq!(codec.verify(&token).unwrap(), manager());
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let issued = Utc::now() - Duration::hours(2);
        let token = codec.issue_at(&manager(), issued, Duration::hours(1)).unwrap();

        let err = codec.verify(&token).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
        assert_eq!(err.kind(), ErrorKind::TokenExpired);
    }

    #[test]
    fn test_tampered_signature() {
        let codec = codec();
        let token = codec.issue(&manager(), Duration::hours(1)).unwrap();

        let (head, sig) = token.rsplit_once('.').unwrap();
        let first = if sig.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{}.{}{}", head, first, &sig[1..]);

        let err = codec.verify(&tampered).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
        assert_eq!(err.kind(), ErrorKind::InvalidToken);
    }

    #[test]
    fn test_tampered_expired_token_is_invalid_not_expired() {
        let codec = codec();
        let issued = Utc::now() - Duration::hours(2);
        let token = codec.issue_at(&manager(), issued, Duration::hours(1)).unwrap();

        let (head, sig) = token.rsplit_once('.').unwrap();
        let first = if sig.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{}.{}{}", head, first, &sig[1..]);

        assert!(matches!(
            codec.verify(&tampered).unwrap_err(),
            TokenError::InvalidSignature
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenCodec::new(b"another-secret-key-32-bytes-long").unwrap();
        let token = other.issue(&manager(), Duration::hours(1)).unwrap();
        assert!(matches!(
            codec().verify(&token).unwrap_err(),
            TokenError::InvalidSignature
        ));
    }

    #[test]
    fn test_malformed_token() {
        let err = codec().verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidToken);
    }

    #[test]
    fn test_unknown_role_in_token_is_rejected() {
        let payload = TokenClaims {
            sub: "u1".into(),
            email: "a@b.com".into(),
            roles: vec!["superuser".into()],
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(matches!(
            codec().verify(&token).unwrap_err(),
            TokenError::Malformed(_)
        ));
    }

    #[test]
    fn test_weak_secret_rejected() {
        assert!(matches!(
            TokenCodec::new(b"short").unwrap_err(),
            TokenError::WeakSecret
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   xyz "), Some("xyz"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("token"), None);
    }
}
