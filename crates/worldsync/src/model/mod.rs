mod entity;
mod store;

pub use entity::{
    Color, Entity, EntityKind, EntityStatus, Geometry, InvalidEntityError, Motion, Vec2,
    Vec3,
};
pub use store::EntityStore;
