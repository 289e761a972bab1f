//! JSON:API Include Resolution
//!
//! Turns the `include` query parameter of a JSON:API request into a
//! compound document: validated include paths, a prefetch plan for the
//! store, and a deduplicated `included` array.
//!
//! The request pipeline runs in four steps:
//!
//! 1. [`resolve_includes`] checks each dotted path against the
//!    [`InclusionSchema`] of the root resource type and builds a
//!    [`ValidatedIncludeSet`] tree.
//! 2. [`plan_prefetches`] turns the tree into [`EagerLoadDirective`]s so a
//!    [`Store`] can load every level in one batch.
//! 3. [`assemble_included`] walks the loaded instances along the tree and
//!    collects every related resource once, skipping primary data.
//! 4. [`Document`] wraps primary data, `included`, links and meta.
//!
//! [`RequestContext`] runs the whole pipeline and also validates
//! `fields`, `sort`, `filter` and `page`.
//!
//! # Example
//!
//! ```
//! use jsonapi_include::{Declaration, MemoryStore, RequestContext, SchemaRegistry, Settings};
//! use serde_json::json;
//!
//! let declaration = Declaration::from_value(&json!({
//!     "resources": {
//!         "actors": {"relationships": {"movies": {"type": "movies"}}},
//!         "movies": {"relationships": {"actors": {"type": "actors"}}}
//!     }
//! }))
//! .unwrap();
//! let registry = SchemaRegistry::from_declaration(declaration).unwrap();
//!
//! let store = MemoryStore::from_value(&json!({
//!     "actors": [
//!         {"id": "1", "attributes": {"name": "Al"},
//!          "relationships": {"movies": [{"type": "movies", "id": "10"}]}}
//!     ],
//!     "movies": [
//!         {"id": "10", "attributes": {"title": "Heat"},
//!          "relationships": {"actors": [{"type": "actors", "id": "1"}]}}
//!     ]
//! }))
//! .unwrap();
//!
//! let context = RequestContext::from_query(
//!     registry.require("actors").unwrap(),
//!     "include=movies.actors",
//!     &Settings::default(),
//! )
//! .unwrap();
//! let document = context.render_collection(&store).unwrap().to_value();
//!
//! // actors:1 is primary data, so only the movie is included
//! assert_eq!(document["included"].as_array().unwrap().len(), 1);
//! assert_eq!(document["included"][0]["id"], "10");
//! assert_eq!(store.lazy_reads(), 0);
//! ```
//!
//! # Error Codes
//!
//! | Code | Parameter | Status |
//! |------|-----------|--------|
//! | `InvalidIncludeParam` | `include` | 400 |
//! | `InvalidFieldParam` | `fields` | 400 |
//! | `InvalidSortParam` | `sort` | 400 |
//! | `InvalidFilterParam` | `filter` | 400 |
//! | `InvalidPageParam` | `page` | 400 |
//!
//! Every failing parameter is reported in one error document.

mod assembler;
mod config;
mod context;
mod document;
mod error;
mod include;
mod linter;
mod loader;
mod memory;
mod pagination;
mod params;
mod planner;
mod query;
mod schema;
mod serializer;
mod store;
mod types;
mod validator;

pub use assembler::{
    assemble_included, assemble_table, serialize_primary, IncludedResourceTable, ResourceTable,
};
pub use config::{Settings, DEFAULT_MAX_SORTS};
pub use context::RequestContext;
pub use document::{
    Document, DocumentBuilder, DocumentLinks, ErrorDocument, ErrorLinks, ErrorObject,
    ErrorSource, JsonApiObject, PrimaryData,
};
pub use error::{
    aggregate_status, status_line, AggregateValidationError, ApiError, IncludeError,
    JsonApiError, LoadError, ParamError, SchemaError, StoreError,
};
pub use include::{resolve_includes, IncludeNode, NodeId, ValidatedIncludeSet};
pub use linter::{
    check_declaration, lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity,
};
pub use loader::{
    is_url, load_dataset, load_declaration, load_document, load_document_auto,
    load_document_str, load_registry,
};
pub use memory::{Dataset, Linkage, MemoryInstance, MemoryStore, Record};
pub use pagination::{LimitOffset, PageLinks, PageMeta, LIMIT_PARAM, OFFSET_PARAM};
pub use params::{parse_include, Fieldsets, QueryParams, RelationshipPath};
pub use planner::{plan_prefetches, EagerLoadDirective};
pub use query::{
    parse_filters, parse_sort, sort_order, FieldFilter, Lookup, Query, ScopedQuery, SortKey,
    LOOKUP_SEPARATOR,
};
pub use schema::{
    Declaration, DeclaredSchema, InclusionSchema, RelationshipDecl, ResourceDecl,
    SchemaRegistry, SchemaRegistryBuilder,
};
pub use serializer::{
    JsonApiSerializer, RelationshipData, RelationshipLinks, RelationshipObject, Resource,
    ResourceLinks, ResourceSerializer,
};
pub use store::{Instance, Related, Store};
pub use types::{
    is_member_name, IncludeOptions, ResourceKey, DEFAULT_MAX_PATHS, DEFAULT_MAX_RELATIONS,
    JSONAPI_VERSION, PATH_SEPARATOR,
};
pub use validator::{declaration_schema, validate_against_schema, validate_declaration};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
