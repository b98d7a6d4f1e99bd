mod atomic_io;
pub mod classify;
pub mod codec;
mod document;
pub mod xml;

pub(crate) use atomic_io::write_text_atomic;
pub use codec::{decode_entity, encode_entity, entity_element, MalformedEntityError};
pub use document::{SceneDocument, SceneError};
pub use xml::{XmlElement, XmlParseError};
