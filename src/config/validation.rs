//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (secret length, timeouts > 0, attempts >= 1)
//! - Check upstream definitions (absolute http targets, unique prefixes)
//! - Reject unknown role names in edge rules
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::auth::roles::Role;
use crate::auth::token::MIN_SECRET_LEN;
use crate::config::schema::GatewayConfig;

/// Upper bound for `auth.token_ttl_secs` (one year).
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.secret",
            format!("must be at least {} bytes (set it or GATEWAY_AUTH_SECRET)", MIN_SECRET_LEN),
        ));
    }
    if config.auth.token_ttl_secs == 0 || config.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
        errors.push(ValidationError::new(
            "auth.token_ttl_secs",
            format!("must be between 1 and {}", MAX_TOKEN_TTL_SECS),
        ));
    }

    for (i, rule) in config.gateway.public_routes.iter().enumerate() {
        if !rule.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("gateway.public_routes[{}].path", i),
                "must start with '/'",
            ));
        }
    }

    for (i, rule) in config.gateway.role_rules.iter().enumerate() {
        if !rule.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("gateway.role_rules[{}].path", i),
                "must start with '/'",
            ));
        }
        if rule.roles.is_empty() {
            errors.push(ValidationError::new(
                format!("gateway.role_rules[{}].roles", i),
                "must list at least one role",
            ));
        }
        for name in &rule.roles {
            if name.parse::<Role>().is_err() {
                errors.push(ValidationError::new(
                    format!("gateway.role_rules[{}].roles", i),
                    format!("unknown role '{}'", name),
                ));
            }
        }
    }

    if config.upstreams.is_empty() {
        errors.push(ValidationError::new("upstreams", "at least one upstream is required"));
    }

    let mut prefixes = HashSet::new();
    let mut names = HashSet::new();
    for (i, upstream) in config.upstreams.iter().enumerate() {
        if upstream.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("upstreams[{}].name", i), "must not be empty"));
        } else if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(
                format!("upstreams[{}].name", i),
                format!("duplicate upstream name '{}'", upstream.name),
            ));
        }

        if !upstream.prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("upstreams[{}].prefix", i),
                "must start with '/'",
            ));
        } else if !prefixes.insert(upstream.prefix.trim_end_matches('/')) {
            errors.push(ValidationError::new(
                format!("upstreams[{}].prefix", i),
                format!("duplicate prefix '{}'", upstream.prefix),
            ));
        }

        if let Some(rewrite) = &upstream.rewrite {
            if !rewrite.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("upstreams[{}].rewrite", i),
                    "must start with '/'",
                ));
            }
        }

        match Url::parse(&upstream.target) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                format!("upstreams[{}].target", i),
                "must be an absolute http:// URL",
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("upstreams[{}].target", i),
                format!("invalid URL: {}", e),
            )),
        }
    }

    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }
    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RoleRuleConfig, MatchKind, UpstreamConfig};

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.secret = "0123456789abcdef0123456789abcdef".into();
        config
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_defaults_with_secret_are_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.auth.secret = "short".into();
        config.timeouts.upstream_ms = 0;
        config.retries.max_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields = fields(&errors);
        assert!(fields.contains(&"auth.secret"));
        assert!(fields.contains(&"timeouts.upstream_ms"));
        assert!(fields.contains(&"retries.max_attempts"));
    }

    #[test]
    fn test_rejects_bad_upstreams() {
        let mut config = valid();
        config.upstreams.push(UpstreamConfig {
            name: "dup".into(),
            prefix: "/api/v1/orders/".into(),
            target: "https://orders.internal".into(),
            rewrite: Some("v2".into()),
        });
        config.upstreams.push(UpstreamConfig {
            name: "broken".into(),
            prefix: "api".into(),
            target: "not a url".into(),
            rewrite: None,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields = fields(&errors);
        assert!(fields.contains(&"upstreams[2].prefix"));
        assert!(fields.contains(&"upstreams[2].target"));
        assert!(fields.contains(&"upstreams[2].rewrite"));
        assert!(fields.contains(&"upstreams[3].prefix"));
        assert!(fields.contains(&"upstreams[3].target"));
    }

    #[test]
    fn test_rejects_unknown_role_in_rule() {
        let mut config = valid();
        config.gateway.role_rules.push(RoleRuleConfig {
            path: "/api/v1/users".into(),
            kind: MatchKind::Exact,
            roles: vec!["admin".into(), "root".into()],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("root"));
    }
}
