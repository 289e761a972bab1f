//! Compound document assembly: walks primary instances along the validated
//! include tree and collects every related resource exactly once.

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::include::{NodeId, ValidatedIncludeSet};
use crate::schema::InclusionSchema;
use crate::serializer::{Resource, ResourceSerializer};
use crate::store::Instance;
use crate::types::ResourceKey;

/// Serialized resources keyed by `(type, id)`, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    entries: IndexMap<ResourceKey, Resource>,
}

/// Table of resources reached through include paths.
pub type IncludedResourceTable = ResourceTable;

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource unless its key is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, resource: Resource) -> bool {
        let key = resource.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, resource);
        true
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values()
    }

    pub fn into_values(self) -> Vec<Resource> {
        self.entries.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialize the primary instances.
///
/// Returns the resources in query order together with the table used to
/// keep them out of `included`. Relationships included from the root carry
/// linkage.
pub fn serialize_primary<M, R>(
    validated: &ValidatedIncludeSet,
    root: &dyn InclusionSchema,
    primary: &[M],
    serializer: &R,
) -> Result<(Vec<Resource>, ResourceTable), StoreError>
where
    M: Instance,
    R: ResourceSerializer,
{
    let linkage = validated.root_names();
    let mut data = Vec::with_capacity(primary.len());
    let mut table = ResourceTable::new();
    for instance in primary {
        let resource = serializer.serialize(root, instance, &linkage)?;
        table.insert(resource.clone());
        data.push(resource);
    }
    Ok((data, table))
}

/// Build the table of every resource reachable along `validated`.
///
/// Nodes are walked depth first in insertion order. At each node the
/// relationship is read off every parent; a related resource not seen
/// before is serialized with that node's schema and becomes a parent for
/// the node's children. A resource already in the table is neither
/// serialized nor walked again, which bounds the work on cyclic and
/// diamond shaped graphs to one visit per resource.
pub fn assemble_table<M, R>(
    validated: &ValidatedIncludeSet,
    primary: &[M],
    serializer: &R,
) -> Result<IncludedResourceTable, StoreError>
where
    M: Instance,
    R: ResourceSerializer,
{
    let mut table = IncludedResourceTable::new();
    let mut stack: Vec<(NodeId, Vec<M>)> = validated
        .roots()
        .map(|node| (node.id, primary.to_vec()))
        .collect();
    stack.reverse();

    while let Some((id, parents)) = stack.pop() {
        let Some(node) = validated.node(id) else {
            continue;
        };
        let linkage: Vec<&str> = validated
            .children(id)
            .map(|child| child.relationship.as_str())
            .collect();

        let mut discovered = Vec::new();
        for parent in &parents {
            for related in parent.read_relationship(&node.relationship)?.into_vec() {
                if table.contains(&related.key()) {
                    continue;
                }
                let resource =
                    serializer.serialize(node.target_schema.as_ref(), &related, &linkage)?;
                table.insert(resource);
                discovered.push(related);
            }
        }

        tracing::trace!(
            path = %node.path,
            parents = parents.len(),
            discovered = discovered.len(),
            "walked include node"
        );

        if discovered.is_empty() {
            continue;
        }
        let children: Vec<NodeId> = node.children.iter().rev().copied().collect();
        for child in children {
            stack.push((child, discovered.clone()));
        }
    }

    Ok(table)
}

/// Collect the `included` array of a compound document.
///
/// Resources also present in `primary_table` stay out of the result, so
/// every resource appears once in the document.
pub fn assemble_included<M, R>(
    validated: &ValidatedIncludeSet,
    primary: &[M],
    primary_table: &ResourceTable,
    serializer: &R,
) -> Result<Vec<Resource>, StoreError>
where
    M: Instance,
    R: ResourceSerializer,
{
    let table = assemble_table(validated, primary, serializer)?;
    let walked = table.len();
    let included: Vec<Resource> = table
        .into_values()
        .into_iter()
        .filter(|resource| !primary_table.contains(&resource.key()))
        .collect();

    tracing::debug!(
        walked,
        included = included.len(),
        "assembled included resources"
    );
    Ok(included)
}
