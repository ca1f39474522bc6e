/// The two record sinks and the owner-thread dispatcher the tree sink
/// marshals its mutations through.
///
/// - [`XmlFileSink`]: streams records to disk, backpatching directory sizes.
/// - [`TreeSink`]: mirrors records into a live document.
pub mod dispatcher;
pub mod file_sink;
pub mod tree_sink;

pub use dispatcher::{DispatchLoop, Dispatcher};
pub use file_sink::{XmlFileSink, SIZE_FIELD_WIDTH};
pub use tree_sink::{TreeCursor, TreeSink};
