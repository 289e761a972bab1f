//! In-memory [`Store`] over a JSON fixture.
//!
//! The fixture maps each resource type to its records:
//!
//! ```json
//! {
//!   "actors": [
//!     {
//!       "id": "1",
//!       "attributes": {"name": "Al Pacino"},
//!       "relationships": {
//!         "movies": [{"type": "movies", "id": "10"}],
//!         "agent": {"type": "agents", "id": "3"}
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Eager-load directives are executed up front, level by level. Reading a
//! relationship that was not eager loaded still works but is counted as a
//! lazy read, which is what the N+1 tests assert on.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{LoadError, StoreError};
use crate::planner::EagerLoadDirective;
use crate::query::{sort_order, FieldFilter, Query, ScopedQuery, SortKey};
use crate::store::{Instance, Related, Store};
use crate::types::ResourceKey;

/// Relationship linkage of a fixture record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceKey>),
    One(Option<ResourceKey>),
}

impl Linkage {
    fn to_related(&self) -> Related<ResourceKey> {
        match self {
            Linkage::Many(keys) => Related::Many(keys.clone()),
            Linkage::One(Some(key)) => Related::One(key.clone()),
            Linkage::One(None) => Related::Unset,
        }
    }
}

/// One stored resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: IndexMap<String, Linkage>,
}

impl Record {
    /// Attribute value by name; `id` is addressable too.
    fn field(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.attributes.get(name).cloned()
    }

    fn matches(&self, filters: &[FieldFilter]) -> bool {
        filters
            .iter()
            .all(|f| f.lookup.matches(self.field(&f.field).as_ref(), &f.value))
    }
}

/// Fixture contents: resource type → records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    pub resources: IndexMap<String, Vec<Record>>,
}

impl Dataset {
    pub fn from_value(value: &Value) -> Result<Self, LoadError> {
        Dataset::deserialize(value).map_err(|e| LoadError::InvalidDataset {
            message: e.to_string(),
        })
    }
}

type Records = IndexMap<ResourceKey, Record>;

fn lookup<'a>(records: &'a Records, key: &ResourceKey) -> Result<&'a Record, StoreError> {
    records
        .get(key)
        .ok_or_else(|| StoreError::MissingResource { key: key.clone() })
}

/// Follow the stored linkage of `parent.name`.
fn follow(
    records: &Records,
    parent: &ResourceKey,
    name: &str,
) -> Result<Related<ResourceKey>, StoreError> {
    let record = lookup(records, parent)?;
    let related = record
        .relationships
        .get(name)
        .map(Linkage::to_related)
        .unwrap_or(Related::Unset);
    for key in related.as_slice() {
        lookup(records, key)?;
    }
    Ok(related)
}

fn sort_rows(rows: &mut [(&ResourceKey, &Record)], ordering: &[SortKey]) {
    if ordering.is_empty() {
        return;
    }
    rows.sort_by(|(_, a), (_, b)| {
        ordering
            .iter()
            .map(|key| {
                let ord = sort_order(a.field(&key.field).as_ref(), b.field(&key.field).as_ref());
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Narrow an eager-loaded relationship by its scope.
fn apply_scope(
    records: &Records,
    related: Related<ResourceKey>,
    scope: &ScopedQuery,
) -> Result<Related<ResourceKey>, StoreError> {
    if scope.is_empty() {
        return Ok(related);
    }
    match related {
        Related::Unset => Ok(Related::Unset),
        Related::One(key) => {
            if lookup(records, &key)?.matches(&scope.filters) {
                Ok(Related::One(key))
            } else {
                Ok(Related::Unset)
            }
        }
        Related::Many(keys) => {
            let mut rows = keys
                .iter()
                .map(|key| lookup(records, key).map(|record| (key, record)))
                .collect::<Result<Vec<_>, _>>()?;
            rows.retain(|(_, record)| record.matches(&scope.filters));
            sort_rows(&mut rows, &scope.ordering);
            Ok(Related::Many(
                rows.into_iter().map(|(key, _)| key.clone()).collect(),
            ))
        }
    }
}

/// [`Store`] backed by an in-memory [`Dataset`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: Arc<Records>,
    lazy_reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Index a dataset. Fails on a record stored twice.
    pub fn new(dataset: Dataset) -> Result<Self, LoadError> {
        let mut records = Records::new();
        for (rtype, rows) in dataset.resources {
            for record in rows {
                let key = ResourceKey::new(rtype.clone(), record.id.clone());
                if records.contains_key(&key) {
                    return Err(LoadError::InvalidDataset {
                        message: format!("resource {} is stored twice", key),
                    });
                }
                records.insert(key, record);
            }
        }
        Ok(Self {
            records: Arc::new(records),
            lazy_reads: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, LoadError> {
        Self::new(Dataset::from_value(value)?)
    }

    /// Relationship reads that were not covered by an eager load.
    pub fn lazy_reads(&self) -> usize {
        self.lazy_reads.load(AtomicOrdering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn select(&self, query: &Query) -> Vec<ResourceKey> {
        let mut rows: Vec<(&ResourceKey, &Record)> = self
            .records
            .iter()
            .filter(|(key, _)| key.rtype == query.resource_type)
            .filter(|(key, _)| {
                query
                    .ids
                    .as_ref()
                    .map_or(true, |ids| ids.iter().any(|id| *id == key.id))
            })
            .filter(|(_, record)| record.matches(&query.scope.filters))
            .collect();
        sort_rows(&mut rows, &query.scope.ordering);

        rows.into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Store for MemoryStore {
    type Instance = MemoryInstance;

    fn execute_with_eager_loads(
        &self,
        query: &Query,
        directives: &[EagerLoadDirective],
    ) -> Result<Vec<MemoryInstance>, StoreError> {
        let primary = self.select(query);

        let mut levels: HashMap<String, Vec<ResourceKey>> = HashMap::new();
        let mut prefetched: Prefetched = HashMap::new();
        for directive in directives {
            let parents: &[ResourceKey] = match directive.parent_path() {
                Some(parent) => levels.get(parent).map(Vec::as_slice).unwrap_or_default(),
                None => &primary,
            };
            let relationship = directive.relationship();

            let mut loaded: IndexSet<ResourceKey> = IndexSet::new();
            for parent in parents {
                let related = follow(&self.records, parent, relationship)?;
                let related = apply_scope(&self.records, related, &directive.query)?;
                loaded.extend(related.as_slice().iter().cloned());
                prefetched
                    .entry(parent.clone())
                    .or_default()
                    .entry(relationship.to_string())
                    .or_insert(related);
            }
            tracing::trace!(
                path = %directive.path,
                parents = parents.len(),
                loaded = loaded.len(),
                "eager loaded"
            );
            levels.insert(directive.path.clone(), loaded.into_iter().collect());
        }

        tracing::debug!(
            resource_type = %query.resource_type,
            rows = primary.len(),
            directives = directives.len(),
            "executed query"
        );

        let session = Arc::new(Session {
            records: Arc::clone(&self.records),
            prefetched,
            lazy_reads: Arc::clone(&self.lazy_reads),
        });
        Ok(primary
            .into_iter()
            .map(|key| MemoryInstance {
                session: Arc::clone(&session),
                key,
            })
            .collect())
    }

    fn count(&self, query: &Query) -> Result<usize, StoreError> {
        Ok(self.select(&query.unwindowed()).len())
    }
}

type Prefetched = HashMap<ResourceKey, HashMap<String, Related<ResourceKey>>>;

/// State shared by every instance of one query execution.
struct Session {
    records: Arc<Records>,
    prefetched: Prefetched,
    lazy_reads: Arc<AtomicUsize>,
}

/// Instance handed out by [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryInstance {
    session: Arc<Session>,
    key: ResourceKey,
}

impl MemoryInstance {
    fn sibling(&self, key: ResourceKey) -> Self {
        Self {
            session: Arc::clone(&self.session),
            key,
        }
    }
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemoryInstance").field(&self.key).finish()
    }
}

impl Instance for MemoryInstance {
    fn resource_type(&self) -> &str {
        &self.key.rtype
    }

    fn identifier(&self) -> &str {
        &self.key.id
    }

    fn attributes(&self) -> Map<String, Value> {
        self.session
            .records
            .get(&self.key)
            .map(|r| r.attributes.clone())
            .unwrap_or_default()
    }

    fn read_relationship(&self, name: &str) -> Result<Related<Self>, StoreError> {
        let cached = self
            .session
            .prefetched
            .get(&self.key)
            .and_then(|by_name| by_name.get(name));

        let related = match cached {
            Some(related) => related.clone(),
            None => {
                self.session.lazy_reads.fetch_add(1, AtomicOrdering::Relaxed);
                tracing::debug!(resource = %self.key, relationship = name, "lazy relationship read");
                follow(&self.session.records, &self.key, name)?
            }
        };
        Ok(related.map(|key| self.sibling(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Lookup;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_value(&json!({
            "actors": [
                {"id": "1", "attributes": {"name": "Al Pacino", "born": 1940},
                 "relationships": {
                     "movies": [{"type": "movies", "id": "10"}, {"type": "movies", "id": "11"}],
                     "agent": null,
                     "memberships": [
                         {"type": "memberships", "id": "m1"},
                         {"type": "memberships", "id": "m2"},
                         {"type": "memberships", "id": "m3"}
                     ]
                 }},
                {"id": "2", "attributes": {"name": "Robert De Niro", "born": 1943},
                 "relationships": {"movies": [{"type": "movies", "id": "10"}]}},
                {"id": "3", "attributes": {"name": "Val Kilmer", "born": 1959}}
            ],
            "movies": [
                {"id": "10", "attributes": {"title": "Heat"},
                 "relationships": {"studio": {"type": "studios", "id": "s1"}}},
                {"id": "11", "attributes": {"title": "The Insider"}}
            ],
            "studios": [{"id": "s1", "attributes": {"name": "Warner"}}],
            "memberships": [
                {"id": "m1", "attributes": {"active": true, "joined": 1990}},
                {"id": "m2", "attributes": {"active": false, "joined": 1995}},
                {"id": "m3", "attributes": {"active": true, "joined": 2001}}
            ]
        }))
        .unwrap()
    }

    fn directive(path: &str, resource_type: &str, query: ScopedQuery) -> EagerLoadDirective {
        EagerLoadDirective {
            path: path.to_string(),
            segments: path.split('.').map(String::from).collect(),
            resource_type: resource_type.to_string(),
            scoped: !query.is_empty(),
            query,
        }
    }

    fn ids(instances: &[MemoryInstance]) -> Vec<&str> {
        instances.iter().map(|i| i.identifier()).collect()
    }

    #[test]
    fn filters_sorts_and_windows() {
        let store = store();
        let query = Query::new("actors")
            .scope(
                ScopedQuery::new()
                    .filter(FieldFilter::new("born", Lookup::Gt, "1941"))
                    .order_by("-born"),
            )
            .window(0, Some(1));
        let rows = store.execute_with_eager_loads(&query, &[]).unwrap();
        assert_eq!(ids(&rows), vec!["3"]);
        assert_eq!(store.count(&query).unwrap(), 2);
    }

    #[test]
    fn mixed_type_attributes_sort_by_type_then_value() {
        let store = MemoryStore::from_value(&json!({
            "movies": [
                {"id": "1", "attributes": {"year": "1990"}},
                {"id": "2", "attributes": {"year": 1999}},
                {"id": "3"},
                {"id": "4", "attributes": {"year": 1985}},
                {"id": "5", "attributes": {"year": null}},
                {"id": "6", "attributes": {"year": true}}
            ]
        }))
        .unwrap();

        let ascending = Query::new("movies").scope(ScopedQuery::new().order_by("year"));
        let rows = store.execute_with_eager_loads(&ascending, &[]).unwrap();
        assert_eq!(ids(&rows), vec!["3", "5", "6", "4", "2", "1"]);

        let descending = Query::new("movies").scope(ScopedQuery::new().order_by("-year"));
        let rows = store.execute_with_eager_loads(&descending, &[]).unwrap();
        assert_eq!(ids(&rows), vec!["1", "2", "4", "6", "3", "5"]);
    }

    #[test]
    fn selects_by_id() {
        let store = store();
        let rows = store
            .execute_with_eager_loads(&Query::new("actors").ids(["2"]), &[])
            .unwrap();
        assert_eq!(ids(&rows), vec!["2"]);
        assert_eq!(rows[0].attributes()["name"], "Robert De Niro");
    }

    #[test]
    fn eager_loaded_reads_are_not_lazy() {
        let store = store();
        let directives = vec![
            directive("movies", "movies", ScopedQuery::new()),
            directive("movies.studio", "studios", ScopedQuery::new()),
        ];
        let rows = store
            .execute_with_eager_loads(&Query::new("actors"), &directives)
            .unwrap();

        for actor in &rows {
            for movie in actor.read_relationship("movies").unwrap().into_vec() {
                movie.read_relationship("studio").unwrap();
            }
        }
        assert_eq!(store.lazy_reads(), 0);

        let movies = rows[0].read_relationship("movies").unwrap().into_vec();
        assert_eq!(ids(&movies), vec!["10", "11"]);
        match movies[0].read_relationship("studio").unwrap() {
            Related::One(studio) => assert_eq!(studio.key(), ResourceKey::new("studios", "s1")),
            other => panic!("expected one studio, got {other:?}"),
        }
        assert!(matches!(
            movies[1].read_relationship("studio").unwrap(),
            Related::Unset
        ));
    }

    #[test]
    fn uncovered_reads_are_counted() {
        let store = store();
        let rows = store
            .execute_with_eager_loads(&Query::new("actors").ids(["1"]), &[])
            .unwrap();
        let movies = rows[0].read_relationship("movies").unwrap();
        assert_eq!(movies.as_slice().len(), 2);
        assert!(matches!(
            rows[0].read_relationship("agent").unwrap(),
            Related::Unset
        ));
        assert_eq!(store.lazy_reads(), 2);
    }

    #[test]
    fn scoped_eager_load_filters_and_orders() {
        let store = store();
        let scope = ScopedQuery::new()
            .filter(FieldFilter::new("active", Lookup::Exact, true))
            .order_by("-joined");
        let rows = store
            .execute_with_eager_loads(
                &Query::new("actors").ids(["1"]),
                &[directive("memberships", "memberships", scope)],
            )
            .unwrap();

        let memberships = rows[0].read_relationship("memberships").unwrap().into_vec();
        assert_eq!(ids(&memberships), vec!["m3", "m1"]);
        assert_eq!(store.lazy_reads(), 0);
    }

    #[test]
    fn dangling_linkage_is_a_store_error() {
        let store = MemoryStore::from_value(&json!({
            "movies": [{"id": "1", "relationships": {"studio": {"type": "studios", "id": "x"}}}]
        }))
        .unwrap();

        let err = store
            .execute_with_eager_loads(
                &Query::new("movies"),
                &[directive("studio", "studios", ScopedQuery::new())],
            )
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingResource {
                key: ResourceKey::new("studios", "x")
            }
        );
    }

    #[test]
    fn duplicate_records_rejected() {
        let result = MemoryStore::from_value(&json!({
            "movies": [{"id": "1"}, {"id": "1"}]
        }));
        assert!(matches!(result, Err(LoadError::InvalidDataset { .. })));
    }

    #[test]
    fn malformed_dataset_rejected() {
        let result = MemoryStore::from_value(&json!({"movies": {"id": "1"}}));
        assert!(matches!(result, Err(LoadError::InvalidDataset { .. })));
    }
}
