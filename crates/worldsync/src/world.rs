use crate::model::{Entity, EntityStore};
use crate::scene::SceneDocument;

/// One scene session's data: the persisted document and the entity records
/// that drive reconciliation against it.
#[derive(Debug, Clone)]
pub struct World {
    pub document: SceneDocument,
    pub store: EntityStore,
}

impl World {
    pub fn new(document: SceneDocument) -> Self {
        Self {
            document,
            store: EntityStore::new(),
        }
    }

    /// Entities decoded from the document start out `clean`.
    pub fn from_loaded(document: SceneDocument, entities: Vec<Entity>) -> Self {
        Self {
            document,
            store: EntityStore::from_entities(entities),
        }
    }

    /// The name the document carries, which is the name the simulator uses.
    pub fn name(&self) -> &str {
        self.document.world_name()
    }
}
