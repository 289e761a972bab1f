//! Eager-load planning: one directive per include node.

use serde::Serialize;

use crate::include::ValidatedIncludeSet;
use crate::query::ScopedQuery;

/// Instruction to the store to fetch a relationship path along with the
/// primary query.
///
/// Directives are ordered parents first, so a store executing them in
/// sequence always has the parent level loaded before its children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EagerLoadDirective {
    /// Full dotted path from the primary resource type.
    pub path: String,
    #[serde(skip)]
    pub segments: Vec<String>,
    /// Resource type loaded at the end of the path.
    pub resource_type: String,
    /// Narrowing applied to the loaded collection; empty when unscoped.
    #[serde(skip_serializing_if = "ScopedQuery::is_empty")]
    pub query: ScopedQuery,
    /// Whether `query` came from a scoped relationship declaration.
    pub scoped: bool,
}

impl EagerLoadDirective {
    /// The path one level up, or `None` for a relationship of the root.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(parent, _)| parent)
    }

    /// Relationship name of the last hop.
    pub fn relationship(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

/// Plan the eager loads of a validated include set, in pre-order.
pub fn plan_prefetches(validated: &ValidatedIncludeSet) -> Vec<EagerLoadDirective> {
    let directives: Vec<EagerLoadDirective> = validated
        .preorder()
        .into_iter()
        .map(|node| EagerLoadDirective {
            path: node.path.clone(),
            segments: node.path.split('.').map(String::from).collect(),
            resource_type: node.target_schema.resource_type().to_string(),
            query: node.scoped_query.clone().unwrap_or_default(),
            scoped: node.scoped_query.is_some(),
        })
        .collect();

    tracing::debug!(directives = directives.len(), "planned eager loads");
    directives
}
