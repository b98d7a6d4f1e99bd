use super::entity::{Entity, EntityStatus};

/// Ordered entity records keyed by name. Order is insertion order and is kept
/// so re-serialization stays deterministic.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    entities: Vec<Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entities(entities: Vec<Entity>) -> Self {
        let mut store = Self::new();
        for entity in entities {
            store.add(entity);
        }
        store
    }

    /// Upsert by name: an existing record keeps its slot and takes every field
    /// of `entity`.
    pub fn add(&mut self, entity: Entity) {
        match self.position_of(&entity.name) {
            Some(idx) => self.entities[idx] = entity,
            None => self.entities.push(entity),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.name == name)
    }

    /// Tags the entity for removal; it stays in the store until `prune`.
    pub fn mark_removed(&mut self, name: &str) -> bool {
        match self.find_by_name_mut(name) {
            Some(entity) => {
                entity.status = EntityStatus::Removed;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_status(&mut self, name: &str, status: EntityStatus) {
        if let Some(entity) = self.find_by_name_mut(name) {
            entity.status = status;
        }
    }

    /// Drops every `removed` record and resets survivors to `clean`.
    pub fn prune(&mut self) {
        self.entities
            .retain(|entity| entity.status != EntityStatus::Removed);
        for entity in &mut self.entities {
            entity.status = EntityStatus::Clean;
        }
    }

    pub(crate) fn purge(&mut self, name: &str) {
        self.entities.retain(|entity| entity.name != name);
    }

    pub fn pending_names(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter(|entity| entity.status != EntityStatus::Clean)
            .map(|entity| entity.name.clone())
            .collect()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.entities.iter().position(|entity| entity.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, Geometry, Vec3};

    fn sphere(name: &str, status: EntityStatus) -> Entity {
        Entity::new(
            name,
            Geometry::Sphere {
                position: Vec3::new(0.0, 0.0, 0.5),
                radius: 0.5,
            },
        )
        .with_status(status)
    }

    #[test]
    fn add_replaces_same_name_in_place() {
        let mut store = EntityStore::new();
        store.add(sphere("sphere_1", EntityStatus::New));
        store.add(sphere("sphere_2", EntityStatus::New));
        store.add(sphere("sphere_1", EntityStatus::Updated).with_color(Color::Red));

        assert_eq!(store.len(), 2);
        assert_eq!(store.entities()[0].name, "sphere_1");
        assert_eq!(store.entities()[0].color, Color::Red);
        assert_eq!(store.entities()[0].status, EntityStatus::Updated);
    }

    #[test]
    fn mark_removed_keeps_entity_until_prune() {
        let mut store = EntityStore::new();
        store.add(sphere("sphere_1", EntityStatus::Clean));
        assert!(store.mark_removed("sphere_1"));
        assert!(!store.mark_removed("missing"));
        assert_eq!(
            store.find_by_name("sphere_1").map(|entity| entity.status),
            Some(EntityStatus::Removed)
        );

        store.prune();
        assert!(store.find_by_name("sphere_1").is_none());
    }

    #[test]
    fn prune_cleans_survivors_and_is_idempotent() {
        let mut store = EntityStore::new();
        store.add(sphere("a", EntityStatus::New));
        store.add(sphere("b", EntityStatus::Removed));
        store.add(sphere("c", EntityStatus::Updated));

        store.prune();
        let after_first = store.entities().to_vec();
        store.prune();

        assert_eq!(store.entities(), after_first.as_slice());
        assert_eq!(store.len(), 2);
        assert!(store
            .entities()
            .iter()
            .all(|entity| entity.status == EntityStatus::Clean));
        assert!(store.pending_names().is_empty());
    }
}
