//! Include path validation.
//!
//! Turns the raw `include` values of a request into a [`ValidatedIncludeSet`]:
//! an ordered tree of relationship hops, each resolved against the schema
//! of the resource type it starts from.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::{AggregateValidationError, IncludeError, ParamError};
use crate::params::{parse_include, RelationshipPath};
use crate::query::ScopedQuery;
use crate::schema::InclusionSchema;
use crate::types::IncludeOptions;

/// Index of a node inside its [`ValidatedIncludeSet`].
pub type NodeId = usize;

fn serialize_schema_type<S: Serializer>(
    schema: &Arc<dyn InclusionSchema>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(schema.resource_type())
}

/// One relationship hop of the include tree.
#[derive(Debug, Clone, Serialize)]
pub struct IncludeNode {
    pub id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Relationship name on the parent's resource type.
    pub relationship: String,
    /// Full dotted path from the root, e.g. `movies.venues`.
    pub path: String,
    /// 1 for relationships of the root type.
    pub depth: usize,
    /// Schema of the related resources.
    #[serde(rename = "type", serialize_with = "serialize_schema_type")]
    pub target_schema: Arc<dyn InclusionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoped_query: Option<ScopedQuery>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
}

/// Ordered tree of validated include paths.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Children
/// keep the order in which their paths were first requested.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatedIncludeSet {
    nodes: Vec<IncludeNode>,
    roots: Vec<NodeId>,
    /// Built from the root schema's defaults rather than the request.
    defaulted: bool,
}

impl ValidatedIncludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the child of `parent` named `relationship`, or append it.
    ///
    /// A `parent` of `None` means a relationship of the root type.
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        relationship: &str,
        target_schema: Arc<dyn InclusionSchema>,
        scoped_query: Option<ScopedQuery>,
    ) -> NodeId {
        let siblings = match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots,
        };
        if let Some(&existing) = siblings
            .iter()
            .find(|&&id| self.nodes[id].relationship == relationship)
        {
            return existing;
        }

        let id = self.nodes.len();
        let (path, depth) = match parent {
            Some(p) => {
                let parent = &self.nodes[p];
                (format!("{}.{}", parent.path, relationship), parent.depth + 1)
            }
            None => (relationship.to_string(), 1),
        };
        self.nodes.push(IncludeNode {
            id,
            parent,
            relationship: relationship.to_string(),
            path,
            depth,
            target_schema,
            scoped_query,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&IncludeNode> {
        self.nodes.get(id)
    }

    /// Top level nodes, in request order.
    pub fn roots(&self) -> impl Iterator<Item = &IncludeNode> {
        self.roots.iter().map(move |&id| &self.nodes[id])
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &IncludeNode> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&child| &self.nodes[child])
    }

    /// Relationship names included directly from the root type.
    pub fn root_names(&self) -> Vec<&str> {
        self.roots().map(|n| n.relationship.as_str()).collect()
    }

    /// Every node, parents before children, siblings in insertion order.
    pub fn preorder(&self) -> Vec<&IncludeNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            out.push(node);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Full dotted paths of every node, in pre-order.
    pub fn paths(&self) -> Vec<&str> {
        self.preorder().into_iter().map(|n| n.path.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_defaulted(&self) -> bool {
        self.defaulted
    }
}

/// A resolved segment, before it is committed to the tree.
struct Hop {
    relationship: String,
    target: Arc<dyn InclusionSchema>,
    scoped: Option<ScopedQuery>,
}

/// Validate the raw `include` values of a request against `root`.
///
/// No values (or only empty ones) yields the root schema's default
/// relationships, one level deep. Otherwise every path must stay within
/// the configured limits and every segment must name an includable
/// relationship of the type reached so far. In strict mode all failures
/// are collected; otherwise validation stops at the first one. Either way
/// nothing is returned unless every path is valid.
pub fn resolve_includes<S: AsRef<str>>(
    raw_values: &[S],
    root: &dyn InclusionSchema,
    options: &IncludeOptions,
) -> Result<ValidatedIncludeSet, AggregateValidationError> {
    let paths = parse_include(raw_values);
    if paths.is_empty() {
        return Ok(default_includes(root));
    }

    if paths.len() > options.max_paths {
        return Err(IncludeError::TooManyPaths {
            count: paths.len(),
            max: options.max_paths,
        }
        .into());
    }

    let mut set = ValidatedIncludeSet::new();
    let mut errors = Vec::new();
    for raw in &paths {
        let path = RelationshipPath::parse(raw);
        match resolve_path(&path, root, options) {
            Ok(hops) => {
                let mut parent = None;
                for hop in hops {
                    parent = Some(set.insert(parent, &hop.relationship, hop.target, hop.scoped));
                }
            }
            Err(err) => {
                tracing::debug!(path = %raw, error = %err, "rejected include path");
                errors.push(ParamError::Include(err));
                if !options.strict {
                    break;
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(AggregateValidationError::new(errors));
    }

    tracing::debug!(
        resource_type = root.resource_type(),
        paths = paths.len(),
        nodes = set.len(),
        "validated include paths"
    );
    Ok(set)
}

fn resolve_path(
    path: &RelationshipPath,
    root: &dyn InclusionSchema,
    options: &IncludeOptions,
) -> Result<Vec<Hop>, IncludeError> {
    if path.depth() > options.max_relations {
        return Err(IncludeError::PathTooDeep {
            path: path.as_str().to_string(),
            depth: path.depth(),
            max: options.max_relations,
        });
    }

    let mut hops: Vec<Hop> = Vec::with_capacity(path.depth());
    for segment in path.segments() {
        let schema: &dyn InclusionSchema = match hops.last() {
            Some(hop) => hop.target.as_ref(),
            None => root,
        };
        let target = if schema.is_includable(segment) {
            schema.target_schema(segment)
        } else {
            None
        };
        let Some(target) = target else {
            return Err(IncludeError::UnknownRelationship {
                path: path.as_str().to_string(),
                segment: segment.clone(),
                resource_type: schema.resource_type().to_string(),
            });
        };
        let scoped = schema.scoped_query(segment);
        hops.push(Hop {
            relationship: segment.clone(),
            target,
            scoped,
        });
    }
    Ok(hops)
}

fn default_includes(root: &dyn InclusionSchema) -> ValidatedIncludeSet {
    let mut set = ValidatedIncludeSet {
        defaulted: true,
        ..ValidatedIncludeSet::default()
    };
    for name in root.default_includable_names() {
        match root.target_schema(&name) {
            Some(target) => {
                let scoped = root.scoped_query(&name);
                set.insert(None, &name, target, scoped);
            }
            None => tracing::warn!(
                resource_type = root.resource_type(),
                relationship = %name,
                "default include has no target schema; skipped"
            ),
        }
    }
    tracing::debug!(
        resource_type = root.resource_type(),
        nodes = set.len(),
        "using default includes"
    );
    set
}
