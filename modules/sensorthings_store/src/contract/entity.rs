//! Entity property bags and entity sets
//!
//! An [`Entity`] only carries what was explicitly set on it. A property that is present
//! with [`PropertyValue::Null`] was set to null; a property that is absent was never set.
//! Partial updates rely on that difference.

use std::collections::BTreeMap;

use super::id::Id;
use super::model::{EntityProperty, EntityType, NavProperty, Property};
use super::value::PropertyValue;

/// Value of a navigation property
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// To-one reference; `None` is an explicit null
    One(Option<Box<Entity>>),
    /// To-many collection
    Many(EntitySet),
}

impl Link {
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            Self::One(Some(e)) => Some(e),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&EntitySet> {
        match self {
            Self::Many(set) => Some(set),
            Self::One(_) => None,
        }
    }
}

/// One entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    entity_type: EntityType,
    id: Option<Id>,
    values: BTreeMap<EntityProperty, PropertyValue>,
    links: BTreeMap<NavProperty, Link>,
    extensions: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            id: None,
            values: BTreeMap::new(),
            links: BTreeMap::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// An entity that only names an existing row
    pub fn reference(entity_type: EntityType, id: impl Into<Id>) -> Self {
        let mut entity = Self::new(entity_type);
        entity.id = Some(id.into());
        entity
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: Id) {
        self.id = Some(id);
    }

    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an entity property. `EntityProperty::Id` is carried by [`Entity::set_id`].
    pub fn set(&mut self, property: EntityProperty, value: impl Into<PropertyValue>) {
        if property == EntityProperty::Id {
            tracing::warn!("ignoring id set through the property map; use set_id");
            return;
        }
        self.values.insert(property, value.into());
    }

    pub fn with(mut self, property: EntityProperty, value: impl Into<PropertyValue>) -> Self {
        self.set(property, value);
        self
    }

    pub fn get(&self, property: EntityProperty) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    pub fn unset(&mut self, property: EntityProperty) -> Option<PropertyValue> {
        self.values.remove(&property)
    }

    /// Whether the property was explicitly set, including to null
    pub fn is_set(&self, property: EntityProperty) -> bool {
        match property {
            EntityProperty::Id => self.id.is_some(),
            other => self.values.contains_key(&other),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = (&EntityProperty, &PropertyValue)> {
        self.values.iter()
    }

    pub fn set_link(&mut self, nav: NavProperty, link: Link) {
        self.links.insert(nav, link);
    }

    pub fn link(&self, nav: NavProperty) -> Option<&Link> {
        self.links.get(&nav)
    }

    pub fn take_link(&mut self, nav: NavProperty) -> Option<Link> {
        self.links.remove(&nav)
    }

    pub fn is_link_set(&self, nav: NavProperty) -> bool {
        self.links.contains_key(&nav)
    }

    pub fn links(&self) -> impl Iterator<Item = (&NavProperty, &Link)> {
        self.links.iter()
    }

    pub fn with_one(mut self, nav: NavProperty, entity: Entity) -> Self {
        self.links.insert(nav, Link::One(Some(Box::new(entity))));
        self
    }

    /// Explicitly set a to-one navigation property to null
    pub fn with_null(mut self, nav: NavProperty) -> Self {
        self.links.insert(nav, Link::One(None));
        self
    }

    pub fn with_many(mut self, nav: NavProperty, entities: Vec<Entity>) -> Self {
        let set = EntitySet::from_entities(nav.target(), entities).with_navigation_link(nav);
        self.links.insert(nav, Link::Many(set));
        self
    }

    /// Linked entity of a to-one navigation property
    pub fn linked(&self, nav: NavProperty) -> Option<&Entity> {
        self.links.get(&nav).and_then(Link::as_one)
    }

    /// Linked entities of a to-many navigation property
    pub fn linked_set(&self, nav: NavProperty) -> Option<&EntitySet> {
        self.links.get(&nav).and_then(Link::as_many)
    }

    pub fn set_extension(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.extensions.insert(name.into(), value);
    }

    pub fn extension(&self, name: &str) -> Option<&serde_json::Value> {
        self.extensions.get(name)
    }

    pub fn extensions(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.extensions.iter()
    }

    /// True when only the id is set
    pub fn is_reference(&self) -> bool {
        self.id.is_some()
            && self.values.is_empty()
            && self.links.is_empty()
            && self.extensions.is_empty()
    }

    /// Every property that was explicitly set, in a stable order
    pub fn set_properties(&self) -> Vec<Property> {
        let mut out = Vec::new();
        if self.id.is_some() {
            out.push(Property::Entity(EntityProperty::Id));
        }
        out.extend(self.values.keys().map(|p| Property::Entity(*p)));
        out.extend(self.links.keys().map(|n| Property::Navigation(*n)));
        out.extend(self.extensions.keys().map(|k| Property::Extension(k.clone())));
        out
    }
}

/// Ordered collection of entities of one type
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    entity_type: EntityType,
    entities: Vec<Entity>,
    count: Option<u64>,
    navigation_link: Option<NavProperty>,
    has_more: bool,
}

impl EntitySet {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entities: Vec::new(),
            count: None,
            navigation_link: None,
            has_more: false,
        }
    }

    pub fn from_entities(entity_type: EntityType, entities: Vec<Entity>) -> Self {
        Self {
            entities,
            ..Self::new(entity_type)
        }
    }

    /// Record the navigation property this set was loaded through
    pub fn with_navigation_link(mut self, nav: NavProperty) -> Self {
        self.navigation_link = Some(nav);
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn navigation_link(&self) -> Option<NavProperty> {
        self.navigation_link
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn set_count(&mut self, count: u64) {
        self.count = Some(count);
    }

    /// True when more entities matched than were returned
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    pub fn ids(&self) -> Vec<Id> {
        self.entities.iter().filter_map(|e| e.id().cloned()).collect()
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_null_are_different() {
        let mut thing = Entity::new(EntityType::Thing).with(EntityProperty::Name, "t");
        thing.set(EntityProperty::Description, PropertyValue::Null);

        assert!(thing.is_set(EntityProperty::Name));
        assert!(thing.is_set(EntityProperty::Description));
        assert!(!thing.is_set(EntityProperty::Properties));
        assert_eq!(thing.get(EntityProperty::Description), Some(&PropertyValue::Null));
    }

    #[test]
    fn explicit_null_link_is_set_but_empty() {
        let obs = Entity::new(EntityType::Observation).with_null(NavProperty::MultiDatastream);
        assert!(obs.is_link_set(NavProperty::MultiDatastream));
        assert!(obs.linked(NavProperty::MultiDatastream).is_none());
    }

    #[test]
    fn references_only_carry_an_id() {
        assert!(Entity::reference(EntityType::Sensor, 3).is_reference());
        assert!(!Entity::reference(EntityType::Sensor, 3)
            .with(EntityProperty::Name, "s")
            .is_reference());
    }

    #[test]
    fn many_links_remember_their_navigation_property() {
        let thing = Entity::new(EntityType::Thing)
            .with_many(NavProperty::Locations, vec![Entity::reference(EntityType::Location, 1)]);
        let set = thing.linked_set(NavProperty::Locations).map(|s| s.navigation_link());
        assert_eq!(set, Some(Some(NavProperty::Locations)));
    }
}
