//! Route lookup for upstream services.
//!
//! # Responsibilities
//! - Store compiled upstream routes
//! - Look up the upstream for a normalized request path
//! - Rewrite the matched prefix and build the upstream URI
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins; ties cannot happen because prefixes are unique
//! - O(n) prefix scan (acceptable for typical upstream counts)
//! - Explicit `None` rather than silent default

use axum::http::uri::{InvalidUri, Uri};
use thiserror::Error;

use crate::config::schema::UpstreamConfig;
use crate::routing::matcher::{normalize_path, prefix_matches};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("upstream '{name}' has an invalid target '{target}': {source}")]
    InvalidTarget {
        name: String,
        target: String,
        #[source]
        source: InvalidUri,
    },
}

/// One compiled upstream.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    name: String,
    prefix: String,
    rewrite: String,
    /// Target base URL without a trailing slash.
    target: String,
}

impl ServiceRoute {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, RouteError> {
        let target = config.target.trim_end_matches('/').to_string();
        target
            .parse::<Uri>()
            .map_err(|source| RouteError::InvalidTarget {
                name: config.name.clone(),
                target: config.target.clone(),
                source,
            })?;

        let prefix = normalize_path(&config.prefix);
        let rewrite = match &config.rewrite {
            Some(rewrite) => normalize_path(rewrite),
            None => prefix.clone(),
        };

        Ok(Self {
            name: config.name.clone(),
            prefix,
            rewrite,
            target,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        prefix_matches(&self.prefix, path)
    }

    /// Substitute the matched prefix with the rewrite prefix. `path` must be
    /// normalized and matched by this route.
    pub fn rewrite(&self, path: &str) -> String {
        let rest = if self.prefix == "/" {
            path
        } else {
            path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
        };

        let base = self.rewrite.trim_end_matches('/');
        let rewritten = format!("{}{}", base, rest);
        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }

    /// Absolute upstream URI for a normalized inbound path and query.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, InvalidUri> {
        let mut uri = format!("{}{}", self.target, self.rewrite(path));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query);
        }
        uri.parse()
    }
}

/// Immutable table of upstream routes.
#[derive(Debug, Clone, Default)]
pub struct ServiceRouter {
    routes: Vec<ServiceRoute>,
}

impl ServiceRouter {
    pub fn from_config(upstreams: &[UpstreamConfig]) -> Result<Self, RouteError> {
        let mut routes = upstreams
            .iter()
            .map(ServiceRoute::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        // Longest prefix first.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(Self { routes })
    }

    /// Find the upstream for a normalized path.
    pub fn match_path(&self, path: &str) -> Option<&ServiceRoute> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.iter().map(ServiceRoute::name).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(name: &str, prefix: &str, target: &str, rewrite: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            name: name.into(),
            prefix: prefix.into(),
            target: target.into(),
            rewrite: rewrite.map(Into::into),
        }
    }

    fn router() -> ServiceRouter {
        ServiceRouter::from_config(&[
            upstream("users", "/api/v1/users", "http://127.0.0.1:4001", None),
            upstream("orders", "/api/v1/orders", "http://127.0.0.1:4002/", None),
            upstream("reports", "/api/v1/orders/reports", "http://127.0.0.1:4003", Some("/reports")),
        ])
        .unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = router();
        assert_eq!(router.match_path("/api/v1/orders/projects").unwrap().name(), "orders");
        assert_eq!(router.match_path("/api/v1/orders/reports/q1").unwrap().name(), "reports");
        assert_eq!(router.match_path("/api/v1/users").unwrap().name(), "users");
    }

    #[test]
    fn test_no_match() {
        let router = router();
        assert!(router.match_path("/api/v1/ordersx").is_none());
        assert!(router.match_path("/other").is_none());
    }

    #[test]
    fn test_identity_rewrite() {
        let router = router();
        let route = router.match_path("/api/v1/orders/projects").unwrap();
        assert_eq!(route.rewrite("/api/v1/orders/projects"), "/api/v1/orders/projects");

        let uri = route
            .upstream_uri("/api/v1/orders/projects", Some("page=2"))
            .unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:4002/api/v1/orders/projects?page=2");
    }

    #[test]
    fn test_prefix_rewrite() {
        let router = router();
        let route = router.match_path("/api/v1/orders/reports/q1").unwrap();
        assert_eq!(route.rewrite("/api/v1/orders/reports/q1"), "/reports/q1");
        assert_eq!(route.rewrite("/api/v1/orders/reports"), "/reports");
    }

    #[test]
    fn test_rewrite_to_root() {
        let route = ServiceRoute::from_config(&upstream(
            "legacy",
            "/legacy",
            "http://10.0.0.1:8000",
            Some("/"),
        ))
        .unwrap();
        assert_eq!(route.rewrite("/legacy"), "/");
        assert_eq!(route.rewrite("/legacy/items/7"), "/items/7");
    }

    #[test]
    fn test_invalid_target() {
        let err = ServiceRouter::from_config(&[upstream("bad", "/x", "http://bad host", None)])
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidTarget { .. }));
    }

    #[test]
    fn test_names_sorted() {
        assert_eq!(router().names(), vec!["orders", "reports", "users"]);
    }
}
