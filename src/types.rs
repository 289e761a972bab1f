//! Core types shared across include resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default maximum number of distinct `include` paths per request.
pub const DEFAULT_MAX_PATHS: usize = 15;

/// Default maximum number of relationship segments in a single path.
pub const DEFAULT_MAX_RELATIONS: usize = 3;

/// JSON:API version advertised in the top-level `jsonapi` member.
pub const JSONAPI_VERSION: &str = "1.0";

/// Separator between relationship names in an include path.
pub const PATH_SEPARATOR: char = '.';

/// Check whether `name` is a legal member name.
///
/// Member names start with an ASCII letter or digit and continue with
/// letters, digits, `-` or `_`.
pub fn is_member_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resource identifier `(type, id)` used as a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    #[serde(rename = "type")]
    pub rtype: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(rtype: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            rtype: rtype.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rtype, self.id)
    }
}

/// Options for include resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeOptions {
    /// Maximum number of distinct paths a request may ask for.
    pub max_paths: usize,
    /// Maximum number of segments in one path.
    pub max_relations: usize,
    /// When true, every failing path is reported together. When false,
    /// validation stops at the first failure. Either way the request fails.
    pub strict: bool,
}

impl IncludeOptions {
    /// Create options with default limits and strict aggregation enabled.
    pub fn new() -> Self {
        Self {
            max_paths: DEFAULT_MAX_PATHS,
            max_relations: DEFAULT_MAX_RELATIONS,
            strict: true,
        }
    }

    /// Set the maximum number of include paths.
    pub fn max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    /// Set the maximum path depth.
    pub fn max_relations(mut self, max_relations: usize) -> Self {
        self.max_relations = max_relations;
        self
    }

    /// Set error aggregation mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for IncludeOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn member_names() {
        assert!(is_member_name("movies"));
        assert!(is_member_name("best-friend"));
        assert!(is_member_name("release_year"));
        assert!(is_member_name("3d"));
        assert!(!is_member_name(""));
        assert!(!is_member_name("-movies"));
        assert!(!is_member_name("movies.venues"));
        assert!(!is_member_name("mov ies"));
    }

    #[test]
    fn resource_key_display() {
        assert_eq!(ResourceKey::new("movies", "1").to_string(), "movies:1");
    }

    #[test]
    fn resource_key_serializes_as_identifier() {
        let key = ResourceKey::new("actors", "7");
        assert_eq!(
            serde_json::to_value(&key).unwrap(),
            json!({"type": "actors", "id": "7"})
        );
    }

    #[test]
    fn include_options_defaults() {
        let opts = IncludeOptions::default();
        assert_eq!(opts.max_paths, DEFAULT_MAX_PATHS);
        assert_eq!(opts.max_relations, DEFAULT_MAX_RELATIONS);
        assert!(opts.strict);

        let opts = IncludeOptions::new().max_relations(1).strict(false);
        assert_eq!(opts.max_relations, 1);
        assert!(!opts.strict);
    }
}
