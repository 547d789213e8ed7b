pub mod entity;
pub mod primitives;
pub mod registry;
pub mod transform;

pub use entity::{Entity, EntityId};
pub use registry::SceneRegistry;
