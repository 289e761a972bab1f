//! Resource object serialization.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::params::Fieldsets;
use crate::schema::InclusionSchema;
use crate::store::{Instance, Related};
use crate::types::ResourceKey;

/// `data` member of a relationship object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationshipData {
    ToOne(Option<ResourceKey>),
    ToMany(Vec<ResourceKey>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipLinks {
    pub related: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// A serialized resource object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub rtype: String,
    pub id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<ResourceLinks>,
}

impl Resource {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.rtype.clone(), self.id.clone())
    }
}

/// Turns instances into resource objects.
pub trait ResourceSerializer {
    /// Serialize `instance` as governed by `schema`.
    ///
    /// Relationships named in `linkage` carry resource linkage (`data`);
    /// they are the ones included from this resource.
    fn serialize<M: Instance>(
        &self,
        schema: &dyn InclusionSchema,
        instance: &M,
        linkage: &[&str],
    ) -> Result<Resource, StoreError>;
}

/// Default serializer honoring sparse fieldsets.
///
/// With a base URL, resources get a `self` link and relationships a
/// `related` link.
#[derive(Debug, Clone, Default)]
pub struct JsonApiSerializer {
    fieldsets: Fieldsets,
    base_url: Option<String>,
}

impl JsonApiSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fieldsets(mut self, fieldsets: Fieldsets) -> Self {
        self.fieldsets = fieldsets;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn resource_url(&self, rtype: &str, id: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}/{}", base, rtype, id))
    }
}

impl ResourceSerializer for JsonApiSerializer {
    fn serialize<M: Instance>(
        &self,
        schema: &dyn InclusionSchema,
        instance: &M,
        linkage: &[&str],
    ) -> Result<Resource, StoreError> {
        let rtype = instance.resource_type();
        let id = instance.identifier();
        let self_url = self.resource_url(rtype, id);

        let attributes: Map<String, Value> = instance
            .attributes()
            .into_iter()
            .filter(|(name, _)| self.fieldsets.allows(rtype, name))
            .collect();

        let mut relationships = IndexMap::new();
        for name in schema.relationship_names() {
            if !self.fieldsets.allows(rtype, &name) {
                continue;
            }

            let links = self_url.as_ref().map(|url| RelationshipLinks {
                related: format!("{}/{}", url, name),
            });
            let data = if linkage.contains(&name.as_str()) {
                Some(match instance.read_relationship(&name)? {
                    Related::Unset => RelationshipData::ToOne(None),
                    Related::One(m) => RelationshipData::ToOne(Some(m.key())),
                    Related::Many(ms) => {
                        RelationshipData::ToMany(ms.iter().map(|m| m.key()).collect())
                    }
                })
            } else {
                None
            };

            if links.is_some() || data.is_some() {
                relationships.insert(name, RelationshipObject { links, data });
            }
        }

        tracing::trace!(resource_type = rtype, id, "serialized resource");
        Ok(Resource {
            rtype: rtype.to_string(),
            id: id.to_string(),
            attributes,
            relationships,
            links: self_url.map(|self_link| ResourceLinks { self_link }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::query::Query;
    use crate::schema::{Declaration, RelationshipDecl, ResourceDecl, SchemaRegistry};
    use crate::store::Store;
    use serde_json::json;

    fn fixture() -> (std::sync::Arc<SchemaRegistry>, MemoryStore) {
        let registry = SchemaRegistry::from_declaration(
            Declaration::new()
                .resource(
                    "actors",
                    ResourceDecl::new()
                        .relationship("movies", RelationshipDecl::new("movies"))
                        .relationship("agent", RelationshipDecl::new("agents")),
                )
                .resource("movies", ResourceDecl::new())
                .resource("agents", ResourceDecl::new()),
        )
        .unwrap();
        let store = MemoryStore::from_value(&json!({
            "actors": [{
                "id": "1",
                "attributes": {"name": "Al Pacino", "born": 1940},
                "relationships": {
                    "movies": [{"type": "movies", "id": "1"}, {"type": "movies", "id": "2"}],
                    "agent": null
                }
            }],
            "movies": [{"id": "1"}, {"id": "2"}]
        }))
        .unwrap();
        (registry, store)
    }

    #[test]
    fn linkage_only_for_named_relationships() {
        let (registry, store) = fixture();
        let actors = registry.get("actors").unwrap();
        let actor = store
            .execute_with_eager_loads(&Query::new("actors"), &[])
            .unwrap()
            .remove(0);

        let resource = JsonApiSerializer::new()
            .serialize(actors.as_ref(), &actor, &["movies", "agent"])
            .unwrap();
        assert_eq!(
            serde_json::to_value(&resource).unwrap(),
            json!({
                "type": "actors",
                "id": "1",
                "attributes": {"name": "Al Pacino", "born": 1940},
                "relationships": {
                    "movies": {"data": [{"type": "movies", "id": "1"}, {"type": "movies", "id": "2"}]},
                    "agent": {"data": null}
                }
            })
        );

        let resource = JsonApiSerializer::new()
            .serialize(actors.as_ref(), &actor, &[])
            .unwrap();
        assert!(resource.relationships.is_empty());
    }

    #[test]
    fn links_and_sparse_fieldsets() {
        let (registry, store) = fixture();
        let actors = registry.get("actors").unwrap();
        let actor = store
            .execute_with_eager_loads(&Query::new("actors"), &[])
            .unwrap()
            .remove(0);

        let mut fieldsets = Fieldsets::new();
        fieldsets.insert("actors", ["name", "movies"]);
        let serializer = JsonApiSerializer::new()
            .fieldsets(fieldsets)
            .base_url("http://api.test/");

        let resource = serializer.serialize(actors.as_ref(), &actor, &[]).unwrap();
        assert_eq!(
            serde_json::to_value(&resource).unwrap(),
            json!({
                "type": "actors",
                "id": "1",
                "attributes": {"name": "Al Pacino"},
                "relationships": {
                    "movies": {"links": {"related": "http://api.test/actors/1/movies"}}
                },
                "links": {"self": "http://api.test/actors/1"}
            })
        );
        assert_eq!(resource.key(), ResourceKey::new("actors", "1"));
    }
}
