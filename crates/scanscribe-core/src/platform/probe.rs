/// Metadata probe: turns one entry's `std::fs::Metadata` into the ordered
/// attribute list carried by its `Add` record.
use super::security::SecurityContext;
use crate::model::{names, Attributes};
use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Timestamp format of the `*Time` attributes (local time).
pub const TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Source of per-entry attributes.
///
/// Never fails: whatever cannot be determined is simply left out.
pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path, metadata: &Metadata) -> Attributes;
}

/// Probe backed by the standard library plus the process security context.
#[derive(Debug, Clone)]
pub struct StandardProbe {
    security: Option<SecurityContext>,
}

impl StandardProbe {
    /// Create a probe. With `collect_security` off, or when the platform has
    /// no security context, `Owner` and `UserRights` are omitted.
    pub fn new(collect_security: bool) -> Self {
        let security = if collect_security {
            SecurityContext::current()
        } else {
            None
        };
        Self { security }
    }

    /// Create a probe around an explicit security context.
    pub fn with_security(security: Option<SecurityContext>) -> Self {
        Self { security }
    }

    /// Whether the scanning process runs with superuser rights.
    pub fn is_elevated(&self) -> bool {
        self.security
            .as_ref()
            .is_some_and(SecurityContext::is_elevated)
    }
}

impl MetadataProbe for StandardProbe {
    fn probe(&self, path: &Path, metadata: &Metadata) -> Attributes {
        let mut attrs = Attributes::with_capacity(7);

        push_time(&mut attrs, names::CREATION_TIME, metadata.created());
        push_time(&mut attrs, names::LAST_ACCESS_TIME, metadata.accessed());
        push_time(&mut attrs, names::LAST_WRITE_TIME, metadata.modified());
        attrs.push(names::ATTRIBUTES, flag_names(path, metadata).join(", "));

        if let Some(security) = &self.security {
            if let Some(owner) = security.owner_of(metadata) {
                attrs.push(names::OWNER, owner);
            }
            if let Some(rights) = security.rights_of(metadata) {
                attrs.push(names::USER_RIGHTS, rights);
            }
        }

        if !metadata.is_dir() {
            attrs.push(names::SIZE, metadata.len().to_string());
        }
        attrs
    }
}

/// Format a timestamp the way every `*Time` attribute is written.
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIME_FORMAT).to_string()
}

fn push_time(attrs: &mut Attributes, name: &str, time: io::Result<SystemTime>) {
    if let Ok(time) = time {
        attrs.push(name, format_time(time));
    }
}

#[cfg(windows)]
fn flag_names(_path: &Path, metadata: &Metadata) -> Vec<&'static str> {
    use std::os::windows::fs::MetadataExt;

    const FLAGS: [(u32, &str); 14] = [
        (0x0001, "ReadOnly"),
        (0x0002, "Hidden"),
        (0x0004, "System"),
        (0x0010, "Directory"),
        (0x0020, "Archive"),
        (0x0040, "Device"),
        (0x0080, "Normal"),
        (0x0100, "Temporary"),
        (0x0200, "SparseFile"),
        (0x0400, "ReparsePoint"),
        (0x0800, "Compressed"),
        (0x1000, "Offline"),
        (0x2000, "NotContentIndexed"),
        (0x4000, "Encrypted"),
    ];

    let bits = metadata.file_attributes();
    FLAGS
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

#[cfg(not(windows))]
fn flag_names(path: &Path, metadata: &Metadata) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if metadata.is_dir() {
        flags.push("Directory");
    }
    if metadata.file_type().is_symlink() {
        flags.push("ReparsePoint");
    }
    if metadata.permissions().readonly() {
        flags.push("ReadOnly");
    }
    if path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    {
        flags.push("Hidden");
    }
    if flags.is_empty() {
        flags.push("Normal");
    }
    flags
}
