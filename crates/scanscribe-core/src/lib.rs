/// ScanScribe Core: directory scanning pipeline and data model.
///
/// This crate contains all business logic with zero UI dependencies.
/// One producer walks a directory tree and emits a record per entry; the
/// records fan out to independent sinks, each draining its own queue on its
/// own thread, while a coordinator decides exactly once how the scan ended.
///
/// # Modules
///
/// - [`model`]: records, attributes and the arena-allocated live document.
/// - [`platform`]: per-entry metadata probe and process security context.
/// - [`pipeline`]: producer/consumer contracts, queued consumer, coordinator.
/// - [`sinks`]: streamed file sink, live tree sink and the owner-thread
///   dispatcher.
/// - [`scanner`]: the filesystem producer and the `start_scan` entry point.
/// - [`config`]: scan options.
/// - [`error`]: the pipeline error type.
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod platform;
pub mod scanner;
pub mod sinks;

pub use config::ScanOptions;
pub use error::ScanError;
