use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::HashMap};

/// The property name that resolves to the [`Entity`] type instead of a context entry.
pub const ENTITY_TYPE_PROPERTY: &str = "type";

/// The subject (user, device, session, ...) that gets evaluated against the flags.
///
/// # Examples
///
/// ```rust
/// use flag_engine::Entity;
///
/// let entity = Entity::new(42, "user").with_context("country", "CA");
///
/// assert_eq!(Some("42"), entity.property("").as_deref());
/// assert_eq!(Some("user"), entity.property("type").as_deref());
/// assert_eq!(Some("CA"), entity.property("country").as_deref());
/// assert_eq!(None, entity.property("city"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entity_id", alias = "id")]
    pub id: i64,
    #[serde(rename = "entity_type", alias = "type", default)]
    pub kind: String,
    #[serde(
        rename = "entity_context",
        alias = "context",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub context: HashMap<String, String>,
}

impl Entity {
    pub fn new(id: i64, kind: &str) -> Self {
        Self {
            id,
            kind: kind.to_owned(),
            context: HashMap::new(),
        }
    }

    /// Add an entry to the entity context.
    pub fn with_context(mut self, key: &str, value: &str) -> Self {
        self.context.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Resolve the value a constraint compares against.
    ///
    /// An empty property resolves to the entity ID, [`ENTITY_TYPE_PROPERTY`] resolves to the
    /// entity type and anything else is looked up in the context. A property missing from the
    /// context is unresolved and yields `None`.
    #[inline]
    pub fn property(&self, property: &str) -> Option<Cow<'_, str>> {
        match property {
            "" => Some(Cow::Owned(self.id.to_string())),
            ENTITY_TYPE_PROPERTY => Some(Cow::Borrowed(&self.kind)),
            name => self.context.get(name).map(|value| Cow::Borrowed(value.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AN_ID: i64 = 11;
    const A_TYPE: &str = "user";

    #[test]
    fn resolve_the_id_when_the_property_is_empty() {
        let entity = Entity::new(AN_ID, A_TYPE);

        assert_eq!(Some("11"), entity.property("").as_deref());
    }

    #[test]
    fn resolve_negative_ids_with_their_sign() {
        let entity = Entity::new(-7, A_TYPE);

        assert_eq!(Some("-7"), entity.property("").as_deref());
    }

    #[test]
    fn resolve_the_type_with_the_reserved_property() {
        let entity = Entity::new(AN_ID, A_TYPE).with_context(ENTITY_TYPE_PROPERTY, "shadowed");

        assert_eq!(Some(A_TYPE), entity.property(ENTITY_TYPE_PROPERTY).as_deref());
    }

    #[test]
    fn resolve_context_entries() {
        let entity = Entity::new(AN_ID, A_TYPE).with_context("country", "CA");

        assert_eq!(Some("CA"), entity.property("country").as_deref());
    }

    #[test]
    fn return_none_when_the_context_entry_is_missing() {
        let entity = Entity::new(AN_ID, A_TYPE);

        assert_eq!(None, entity.property("country"));
    }

    #[test]
    fn resolve_empty_context_values_as_resolved() {
        let entity = Entity::new(AN_ID, A_TYPE).with_context("country", "");

        assert_eq!(Some(""), entity.property("country").as_deref());
    }

    #[test]
    fn can_deserialize_the_storage_field_names() {
        let entity: Entity = serde_json::from_str(
            r#"{"entity_id": 3, "entity_type": "device", "entity_context": {"os": "linux"}}"#,
        )
        .unwrap();

        assert_eq!(
            Entity::new(3, "device").with_context("os", "linux"),
            entity
        );
    }

    #[test]
    fn can_deserialize_an_entity_without_context() {
        let entity: Entity = serde_json::from_str(r#"{"id": 3, "type": "device"}"#).unwrap();

        assert_eq!(Entity::new(3, "device"), entity);
    }

    #[test]
    fn skip_the_empty_context_when_serializing() {
        let serialized = serde_json::to_string(&Entity::new(3, "device")).unwrap();

        assert_eq!(r#"{"entity_id":3,"entity_type":"device"}"#, serialized);
    }

    #[test]
    fn serialize_the_storage_field_names() {
        let entity = Entity::new(3, "device").with_context("os", "linux");

        assert_eq!(
            serde_json::json!({
                "entity_id": 3,
                "entity_type": "device",
                "entity_context": {"os": "linux"}
            }),
            serde_json::to_value(&entity).unwrap()
        );
    }
}
