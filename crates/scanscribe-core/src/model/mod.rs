/// Data model for the scan pipeline.
///
/// Records and attributes flow from the producer to the sinks; the arena
/// document is what the tree sink builds for live display.
pub mod attribute;
pub mod document;
pub mod element;
pub mod record;
pub mod size;

pub use attribute::{names, Attribute, Attributes};
pub use document::{LiveDocument, SharedDocument, TreeDocument};
pub use element::{Element, ElementKind, NodeIndex};
pub use record::{Record, RecordKind};
