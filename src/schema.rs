//! Inclusion schemas: which relationships of a resource type may be
//! included, which are included by default, and which schema governs the
//! related resources.
//!
//! Schemas are declared per resource type and collected in a
//! [`SchemaRegistry`]. Relationship targets are named by resource type and
//! only looked up in the registry the first time they are needed, so a
//! declaration may point at itself or at a type declared later.

use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::LoadError;
use crate::linter::{check_declaration, Severity};
use crate::query::{Lookup, ScopedQuery};

/// Per resource type view of the includable relationship graph.
///
/// Implementations are shared read-only across requests.
pub trait InclusionSchema: fmt::Debug + Send + Sync {
    /// JSON:API resource type this schema governs.
    fn resource_type(&self) -> &str;

    /// Every declared relationship, includable or not, in declaration order.
    fn relationship_names(&self) -> Vec<String>;

    /// Whether `name` may appear as a segment of an `include` path here.
    fn is_includable(&self, name: &str) -> bool;

    /// Schema of the resources on the other side of `name`.
    fn target_schema(&self, name: &str) -> Option<Arc<dyn InclusionSchema>>;

    /// Relationships included when the client sends no `include`.
    fn default_includable_names(&self) -> Vec<String>;

    /// Query narrowing the related collection of `name`, if any.
    fn scoped_query(&self, name: &str) -> Option<ScopedQuery>;

    /// Whether the primary collection may be sorted on `field`.
    fn is_sortable(&self, _field: &str) -> bool {
        false
    }

    /// Lookups allowed when filtering the primary collection on `field`.
    fn filter_lookups(&self, _field: &str) -> Vec<Lookup> {
        Vec::new()
    }
}

fn default_true() -> bool {
    true
}

/// Declaration of one relationship.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDecl {
    /// Resource type of the related resources.
    #[serde(rename = "type")]
    pub target: String,
    #[serde(default = "default_true")]
    pub includable: bool,
    /// Included when the request has no `include` parameter.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub scope: Option<ScopedQuery>,
}

impl RelationshipDecl {
    /// An includable, non-default relationship to `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            includable: true,
            default: false,
            scope: None,
        }
    }

    pub fn includable(mut self, includable: bool) -> Self {
        self.includable = includable;
        self
    }

    pub fn default_included(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    pub fn scope(mut self, scope: ScopedQuery) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Declaration of one resource type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipDecl>,
    #[serde(default)]
    pub sortable: Vec<String>,
    #[serde(default)]
    pub filterable: IndexMap<String, Vec<Lookup>>,
}

impl ResourceDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relationship(mut self, name: impl Into<String>, decl: RelationshipDecl) -> Self {
        self.relationships.insert(name.into(), decl);
        self
    }

    pub fn sortable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filterable(mut self, field: impl Into<String>, lookups: &[Lookup]) -> Self {
        self.filterable.insert(field.into(), lookups.to_vec());
        self
    }
}

/// A whole declaration document: resource type → declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, rtype: impl Into<String>, decl: ResourceDecl) -> Self {
        self.resources.insert(rtype.into(), decl);
        self
    }

    /// Deserialize from a JSON document.
    ///
    /// This only checks the shape; use [`crate::validate_declaration`] first
    /// for pointer-precise error reporting.
    pub fn from_value(value: &Value) -> Result<Self, LoadError> {
        Declaration::deserialize(value).map_err(|e| LoadError::InvalidDeclaration {
            message: e.to_string(),
        })
    }
}

/// Where a relationship leads once its target type has been looked up.
#[derive(Clone)]
enum Target {
    Declared(usize),
    Custom(Arc<dyn InclusionSchema>),
}

/// One declared resource type together with its memoized targets.
struct DeclaredResource {
    resource_type: String,
    decl: ResourceDecl,
    targets: IndexMap<String, OnceLock<Option<Target>>>,
}

/// Everything the schemas of one registry resolve targets against.
///
/// Holds declarations and hand written schemas but never a
/// [`DeclaredSchema`], so handles keep it alive without forming a cycle.
struct SchemaGraph {
    declared: IndexMap<String, DeclaredResource>,
    custom: IndexMap<String, Arc<dyn InclusionSchema>>,
}

impl SchemaGraph {
    fn lookup(&self, target: &str) -> Option<Target> {
        if let Some(index) = self.declared.get_index_of(target) {
            return Some(Target::Declared(index));
        }
        self.custom.get(target).cloned().map(Target::Custom)
    }
}

/// [`InclusionSchema`] backed by a [`ResourceDecl`].
///
/// A handle into the declarations of the registry that built it. It stays
/// usable after the registry itself is dropped.
pub struct DeclaredSchema {
    graph: Arc<SchemaGraph>,
    index: usize,
}

impl DeclaredSchema {
    fn resource(&self) -> &DeclaredResource {
        &self.graph.declared[self.index]
    }

    pub fn declaration(&self) -> &ResourceDecl {
        &self.resource().decl
    }

    fn lookup_target(&self, name: &str) -> Option<Target> {
        let resource = self.resource();
        let target = &resource.decl.relationships.get(name)?.target;
        let found = self.graph.lookup(target);
        tracing::trace!(
            resource_type = %resource.resource_type,
            relationship = name,
            target = %target,
            found = found.is_some(),
            "resolved relationship target"
        );
        found
    }
}

impl fmt::Debug for DeclaredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource = self.resource();
        f.debug_struct("DeclaredSchema")
            .field("resource_type", &resource.resource_type)
            .field(
                "relationships",
                &resource.decl.relationships.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl InclusionSchema for DeclaredSchema {
    fn resource_type(&self) -> &str {
        &self.resource().resource_type
    }

    fn relationship_names(&self) -> Vec<String> {
        self.declaration().relationships.keys().cloned().collect()
    }

    fn is_includable(&self, name: &str) -> bool {
        self.declaration()
            .relationships
            .get(name)
            .map(|r| r.includable)
            .unwrap_or(false)
    }

    fn target_schema(&self, name: &str) -> Option<Arc<dyn InclusionSchema>> {
        // concurrent first uses wait on a single lookup
        let cell = self.resource().targets.get(name)?;
        match cell.get_or_init(|| self.lookup_target(name)).as_ref()? {
            Target::Declared(index) => Some(Arc::new(DeclaredSchema {
                graph: Arc::clone(&self.graph),
                index: *index,
            })),
            Target::Custom(schema) => Some(Arc::clone(schema)),
        }
    }

    fn default_includable_names(&self) -> Vec<String> {
        self.declaration()
            .relationships
            .iter()
            .filter(|(_, r)| r.includable && r.default)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn scoped_query(&self, name: &str) -> Option<ScopedQuery> {
        self.declaration().relationships.get(name)?.scope.clone()
    }

    fn is_sortable(&self, field: &str) -> bool {
        self.declaration().sortable.iter().any(|f| f == field)
    }

    fn filter_lookups(&self, field: &str) -> Vec<Lookup> {
        self.declaration()
            .filterable
            .get(field)
            .cloned()
            .unwrap_or_default()
    }
}

/// Resource type → schema. Built once, then shared read-only.
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<dyn InclusionSchema>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Build a registry holding only declared schemas.
    pub fn from_declaration(declaration: Declaration) -> Result<Arc<Self>, LoadError> {
        Self::builder().declaration(declaration).build()
    }

    pub fn get(&self, rtype: &str) -> Option<Arc<dyn InclusionSchema>> {
        self.schemas.get(rtype).cloned()
    }

    /// Like [`get`](Self::get) but failing with a descriptive error.
    pub fn require(&self, rtype: &str) -> Result<Arc<dyn InclusionSchema>, LoadError> {
        self.get(rtype).ok_or_else(|| LoadError::UnknownResourceType {
            rtype: rtype.to_string(),
        })
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("resource_types", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects declared and hand written schemas before freezing them into a
/// [`SchemaRegistry`].
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    declared: IndexMap<String, ResourceDecl>,
    custom: IndexMap<String, Arc<dyn InclusionSchema>>,
}

impl SchemaRegistryBuilder {
    pub fn declare(mut self, rtype: impl Into<String>, decl: ResourceDecl) -> Self {
        self.declared.insert(rtype.into(), decl);
        self
    }

    pub fn declaration(mut self, declaration: Declaration) -> Self {
        self.declared.extend(declaration.resources);
        self
    }

    /// Register a hand written schema under its own resource type.
    pub fn register(mut self, schema: Arc<dyn InclusionSchema>) -> Self {
        self.custom
            .insert(schema.resource_type().to_string(), schema);
        self
    }

    /// Check every declaration and freeze the registry.
    ///
    /// Fails when a relationship targets an unknown resource type, a name
    /// is not a legal member name, or a type is both declared and
    /// registered by hand.
    pub fn build(self) -> Result<Arc<SchemaRegistry>, LoadError> {
        let declaration = Declaration {
            resources: self.declared,
        };
        let external: Vec<&str> = self.custom.keys().map(String::as_str).collect();

        let mut problems: Vec<String> = check_declaration(&declaration, &external)
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.to_string())
            .collect();
        for rtype in self.custom.keys() {
            if declaration.resources.contains_key(rtype) {
                problems.push(format!(
                    "resource type \"{}\" is both declared and registered",
                    rtype
                ));
            }
        }
        if !problems.is_empty() {
            return Err(LoadError::InvalidRegistry { problems });
        }

        let declared = declaration
            .resources
            .into_iter()
            .map(|(rtype, decl)| {
                let targets = decl
                    .relationships
                    .keys()
                    .map(|name| (name.clone(), OnceLock::new()))
                    .collect();
                let resource = DeclaredResource {
                    resource_type: rtype.clone(),
                    decl,
                    targets,
                };
                (rtype, resource)
            })
            .collect();
        let graph = Arc::new(SchemaGraph {
            declared,
            custom: self.custom,
        });

        let mut schemas: IndexMap<String, Arc<dyn InclusionSchema>> = IndexMap::new();
        for (index, rtype) in graph.declared.keys().enumerate() {
            let schema = DeclaredSchema {
                graph: Arc::clone(&graph),
                index,
            };
            schemas.insert(rtype.clone(), Arc::new(schema));
        }
        schemas.extend(
            graph
                .custom
                .iter()
                .map(|(rtype, schema)| (rtype.clone(), Arc::clone(schema))),
        );
        let registry = Arc::new(SchemaRegistry { schemas });

        tracing::debug!(
            resource_types = registry.len(),
            "built inclusion schema registry"
        );
        Ok(registry)
    }
}
