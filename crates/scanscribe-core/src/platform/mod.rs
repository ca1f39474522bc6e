/// Platform-specific functionality: per-entry metadata probing and the
/// process security context used for owner and rights attributes.
pub mod probe;
pub mod security;

pub use probe::{format_time, MetadataProbe, StandardProbe, TIME_FORMAT};
pub use security::{summarize_rights, SecurityContext};
