/// Process security context: owner names and effective access rights.
///
/// On Unix the context is the process's effective uid/gid (read from the
/// ownership of `/proc/self`) plus a uid to user name table parsed from
/// `/etc/passwd`. Elsewhere no context is available and the probe simply
/// omits the `Owner` and `UserRights` attributes.
use std::collections::HashMap;
use std::fs::Metadata;

/// Rights reported in the `UserRights` summary, in output order.
const RIGHTS: [(u32, &str); 3] = [(0o4, "Read"), (0o2, "Write"), (0o1, "Execute")];

/// Identity of the running process and the owner-name lookup table.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    uid: u32,
    gid: u32,
    user_names: HashMap<u32, String>,
}

impl SecurityContext {
    /// Resolve the current process identity.
    ///
    /// Returns `None` when the platform offers no way to resolve it.
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        let proc_self = std::fs::metadata("/proc/self").ok()?;
        let user_names = std::fs::read_to_string("/etc/passwd")
            .map(|text| parse_passwd(&text))
            .unwrap_or_default();
        Some(Self {
            uid: proc_self.uid(),
            gid: proc_self.gid(),
            user_names,
        })
    }

    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        None
    }

    /// Build a context for an explicit identity.
    pub fn with_identity(uid: u32, gid: u32, user_names: HashMap<u32, String>) -> Self {
        Self {
            uid,
            gid,
            user_names,
        }
    }

    /// Whether the process runs as the superuser.
    pub fn is_elevated(&self) -> bool {
        self.uid == 0
    }

    /// Display name for an owner id, falling back to the raw id.
    pub fn owner_name(&self, uid: u32) -> String {
        self.user_names
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    /// Owner display name for an entry.
    #[cfg(unix)]
    pub fn owner_of(&self, metadata: &Metadata) -> Option<String> {
        use std::os::unix::fs::MetadataExt;
        Some(self.owner_name(metadata.uid()))
    }

    #[cfg(not(unix))]
    pub fn owner_of(&self, _metadata: &Metadata) -> Option<String> {
        None
    }

    /// Rights summary for an entry.
    #[cfg(unix)]
    pub fn rights_of(&self, metadata: &Metadata) -> Option<String> {
        use std::os::unix::fs::MetadataExt;
        Some(self.rights_for_mode(metadata.mode(), metadata.uid(), metadata.gid()))
    }

    #[cfg(not(unix))]
    pub fn rights_of(&self, _metadata: &Metadata) -> Option<String> {
        None
    }

    /// Intersect the permission classes of `mode` with this identity.
    ///
    /// The first matching class (owner, group, other) decides, as the kernel
    /// does. Bits it grants are allowed, bits it withholds are denied. The
    /// superuser is allowed everything.
    pub fn rights_for_mode(&self, mode: u32, owner: u32, group: u32) -> String {
        let class_bits = if self.is_elevated() {
            0o7
        } else if self.uid == owner {
            (mode >> 6) & 0o7
        } else if self.gid == group {
            (mode >> 3) & 0o7
        } else {
            mode & 0o7
        };

        let mut allow = Vec::new();
        let mut deny = Vec::new();
        for (bit, right) in RIGHTS {
            if class_bits & bit != 0 {
                push_unique(&mut allow, right);
            } else {
                push_unique(&mut deny, right);
            }
        }
        summarize_rights(&allow, &deny)
    }
}

/// Render `Allow: a, b; Deny: c;`. Each non-empty list ends with `;`.
pub fn summarize_rights(allow: &[&str], deny: &[&str]) -> String {
    let mut out = String::from("Allow:");
    push_list(&mut out, allow);
    out.push_str(" Deny:");
    push_list(&mut out, deny);
    out
}

fn push_list(out: &mut String, items: &[&str]) {
    if items.is_empty() {
        return;
    }
    out.push(' ');
    out.push_str(&items.join(", "));
    out.push(';');
}

fn push_unique<'a>(list: &mut Vec<&'a str>, item: &'a str) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Parse `name:password:uid:...` lines into a uid to name table.
fn parse_passwd(text: &str) -> HashMap<u32, String> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let uid = fields.nth(1)?.parse().ok()?;
            Some((uid, name.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(uid: u32, gid: u32) -> SecurityContext {
        let names = parse_passwd("root:x:0:0::/root:/bin/sh\nalice:x:1000:1000::/home/alice:/bin/sh\n");
        SecurityContext::with_identity(uid, gid, names)
    }

    #[test]
    fn owner_name_falls_back_to_raw_id() {
        let ctx = context(1000, 1000);
        assert_eq!(ctx.owner_name(1000), "alice");
        assert_eq!(ctx.owner_name(4242), "4242");
    }

    #[test]
    fn owner_class_decides_for_owner() {
        let ctx = context(1000, 1000);
        assert_eq!(
            ctx.rights_for_mode(0o640, 1000, 50),
            "Allow: Read, Write; Deny: Execute;"
        );
    }

    #[test]
    fn group_and_other_classes() {
        let ctx = context(1000, 50);
        assert_eq!(
            ctx.rights_for_mode(0o750, 0, 50),
            "Allow: Read, Execute; Deny: Write;"
        );
        let stranger = context(2000, 2000);
        assert_eq!(
            stranger.rights_for_mode(0o750, 0, 50),
            "Allow: Deny: Read, Write, Execute;"
        );
    }

    #[test]
    fn superuser_is_allowed_everything() {
        let ctx = context(0, 0);
        assert!(ctx.is_elevated());
        assert_eq!(
            ctx.rights_for_mode(0o000, 1000, 1000),
            "Allow: Read, Write, Execute; Deny:"
        );
    }

    #[test]
    fn empty_lists_leave_just_the_labels() {
        assert_eq!(summarize_rights(&[], &[]), "Allow: Deny:");
    }

    #[test]
    fn passwd_parser_skips_comments_and_garbage() {
        let table = parse_passwd("# comment\nbroken\nbob:x:1001:1001::/home/bob:/bin/sh\n");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&1001).map(String::as_str), Some("bob"));
    }
}
