/// The unit flowing through the pipeline: one event about one scanned entry.
use super::attribute::{names, Attributes};
use compact_str::{format_compact, CompactString};

/// What a record announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A newly discovered file or directory with its static attributes.
    Add,
    /// A directory whose whole subtree has been produced. Carries only the
    /// aggregated `Size`, or nothing when the directory could not be listed.
    Update,
}

/// One scan event. Never mutated after the producer emits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Base name of the entry (not the full path).
    pub name: CompactString,
    pub is_directory: bool,
    pub kind: RecordKind,
    pub attributes: Attributes,
}

impl Record {
    pub fn add_file(name: impl Into<CompactString>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            kind: RecordKind::Add,
            attributes,
        }
    }

    pub fn add_directory(name: impl Into<CompactString>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            kind: RecordKind::Add,
            attributes,
        }
    }

    /// Closing update for a directory. `size` is `None` when the listing
    /// was denied and the subtree abandoned.
    pub fn update_directory(name: impl Into<CompactString>, size: Option<u64>) -> Self {
        let mut attributes = Attributes::with_capacity(1);
        if let Some(size) = size {
            attributes.push(names::SIZE, format_compact!("{size}"));
        }
        Self {
            name: name.into(),
            is_directory: true,
            kind: RecordKind::Update,
            attributes,
        }
    }

    pub fn is_add(&self) -> bool {
        self.kind == RecordKind::Add
    }

    /// `Size` attribute as a byte count.
    pub fn size(&self) -> Option<u64> {
        self.attributes.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_carries_exactly_the_size() {
        let update = Record::update_directory("docs", Some(1234));
        assert_eq!(update.kind, RecordKind::Update);
        assert!(update.is_directory);
        assert_eq!(update.attributes.len(), 1);
        assert_eq!(update.attributes.get("Size"), Some("1234"));
        assert_eq!(update.size(), Some(1234));
    }

    #[test]
    fn denied_update_has_no_attributes() {
        let update = Record::update_directory("secret", None);
        assert!(update.attributes.is_empty());
        assert_eq!(update.size(), None);
    }

    #[test]
    fn add_constructors_set_kind_and_flag() {
        let file = Record::add_file("a.txt", Attributes::new());
        assert!(file.is_add());
        assert!(!file.is_directory);

        let dir = Record::add_directory("src", Attributes::new());
        assert!(dir.is_add());
        assert!(dir.is_directory);
    }
}
