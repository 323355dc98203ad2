//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! and the internal services. All types derive Serde traits for
//! deserialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration shared by the gateway and the internal services.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway listener.
    pub listener: ListenerConfig,

    /// Token signing settings (shared by every verifying party).
    pub auth: AuthConfig,

    /// Edge authentication rules.
    pub gateway: EdgeConfig,

    /// Internal services the gateway dispatches to.
    pub upstreams: UpstreamList,

    /// Internal service trust settings.
    pub internal: InternalConfig,

    /// Bind addresses for the bundled internal services.
    pub services: ServicesConfig,

    pub timeouts: TimeoutConfig,

    pub retries: RetryConfig,

    pub limits: LimitsConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 shared secret. Overridden by `GATEWAY_AUTH_SECRET`.
    pub secret: String,

    /// Lifetime of tokens issued at login, in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: 3600,
        }
    }
}

/// How a path pattern is compared against the normalized request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Exact,
    Prefix,
}

/// A path pattern in the public allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathRule {
    pub path: String,

    #[serde(rename = "match", default)]
    pub kind: MatchKind,
}

impl PathRule {
    pub fn exact(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: MatchKind::Exact,
        }
    }

    pub fn prefix(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: MatchKind::Prefix,
        }
    }
}

/// Role requirement enforced at the edge for matching paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoleRuleConfig {
    pub path: String,

    #[serde(rename = "match", default)]
    pub kind: MatchKind,

    /// Any of these roles satisfies the rule.
    pub roles: Vec<String>,
}

/// Edge authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Routes exempt from authentication.
    pub public_routes: Vec<PathRule>,

    /// Role requirements checked at the edge.
    pub role_rules: Vec<RoleRuleConfig>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            public_routes: vec![
                PathRule::exact("/"),
                PathRule::exact("/health"),
                PathRule::exact("/api/v1/users/register"),
                PathRule::exact("/api/v1/users/login"),
                PathRule::prefix("/docs"),
            ],
            role_rules: Vec::new(),
        }
    }
}

/// One internal service behind the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Service name for logs and metrics.
    pub name: String,

    /// Inbound path prefix routed to this service.
    pub prefix: String,

    /// Base URL of the service (e.g., "http://127.0.0.1:4002").
    pub target: String,

    /// Replacement for `prefix` on the forwarded path. Defaults to `prefix`.
    #[serde(default)]
    pub rewrite: Option<String>,
}

/// Upstream list with the bundled services as default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UpstreamList(pub Vec<UpstreamConfig>);

impl Default for UpstreamList {
    fn default() -> Self {
        Self(vec![
            UpstreamConfig {
                name: "users".to_string(),
                prefix: "/api/v1/users".to_string(),
                target: "http://127.0.0.1:4001".to_string(),
                rewrite: None,
            },
            UpstreamConfig {
                name: "orders".to_string(),
                prefix: "/api/v1/orders".to_string(),
                target: "http://127.0.0.1:4002".to_string(),
                rewrite: None,
            },
        ])
    }
}

impl std::ops::Deref for UpstreamList {
    type Target = Vec<UpstreamConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for UpstreamList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// What an internal service does with a request that carries no verifiable
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Continue with the anonymous placeholder identity.
    #[default]
    Anonymous,
    /// Reject with an authentication error.
    Deny,
}

/// Internal service trust settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InternalConfig {
    pub fallback: FallbackPolicy,
}

/// Bind addresses for the bundled internal services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub users_bind: String,
    pub orders_bind: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            users_bind: "127.0.0.1:4001".to_string(),
            orders_bind: "127.0.0.1:4002".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Time to wait for upstream response headers, in milliseconds.
    pub upstream_ms: u64,

    /// Total time for one inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            upstream_ms: 10_000,
            request_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 2,
            base_delay_ms: 50,
            max_delay_ms: 500,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "identity_gateway=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [auth]
            secret = "0123456789abcdef0123456789abcdef"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.auth.token_ttl_secs, 3600);
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.internal.fallback, FallbackPolicy::Anonymous);
        assert!(config
            .gateway
            .public_routes
            .iter()
            .any(|r| r.path == "/api/v1/users/login"));
    }

    #[test]
    fn test_full_sections_parse() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [gateway]
            public_routes = [
                { path = "/health" },
                { path = "/docs", match = "prefix" },
            ]

            [[gateway.role_rules]]
            path = "/api/v1/users"
            match = "exact"
            roles = ["admin"]

            [[upstreams]]
            name = "orders"
            prefix = "/api/v1/orders"
            target = "http://10.0.0.5:4002"
            rewrite = "/v1"

            [internal]
            fallback = "deny"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.public_routes.len(), 2);
        assert_eq!(config.gateway.public_routes[0].kind, MatchKind::Exact);
        assert_eq!(config.gateway.public_routes[1].kind, MatchKind::Prefix);
        assert_eq!(config.gateway.role_rules[0].roles, vec!["admin"]);
        assert_eq!(config.upstreams.len(), 1);
        assert_eq!(config.upstreams[0].rewrite.as_deref(), Some("/v1"));
        assert_eq!(config.internal.fallback, FallbackPolicy::Deny);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
