//! Path matching logic.
//!
//! # Responsibilities
//! - Normalize request paths before any comparison
//! - Match exact paths and segment-aware prefixes
//!
//! # Design Decisions
//! - Matching is done on the normalized path only, so `//health/` and
//!   `/api/../health` cannot be used to dodge the public allow-list
//! - Path matching is case-sensitive
//! - A prefix matches whole segments: `/docs` matches `/docs/x`, not `/docsx`
//! - No regex to guarantee O(n) matching

use crate::config::schema::{MatchKind, PathRule};

/// Collapse duplicate slashes, drop `.` segments, resolve `..` and remove the
/// trailing slash. `..` above the root stays at the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Segment-aware prefix test on normalized paths.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// Compile with the pattern itself normalized.
    pub fn new(path: &str, kind: MatchKind) -> Self {
        let path = normalize_path(path);
        match kind {
            MatchKind::Exact => Self::Exact(path),
            MatchKind::Prefix => Self::Prefix(path),
        }
    }

    /// `path` must already be normalized.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == path,
            Self::Prefix(prefix) => prefix_matches(prefix, path),
        }
    }
}

impl From<&PathRule> for PathPattern {
    fn from(rule: &PathRule) -> Self {
        Self::new(&rule.path, rule.kind)
    }
}
