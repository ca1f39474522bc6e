/// Name/value attribute pairs attached to records and tree elements.
///
/// Order matters: the file sink writes attributes in the order they were
/// first added, so `Attributes` is a plain vector rather than a map.
use compact_str::CompactString;

/// Well-known attribute names.
pub mod names {
    pub const NAME: &str = "Name";
    pub const SIZE: &str = "Size";
    pub const CREATION_TIME: &str = "CreationTime";
    pub const LAST_ACCESS_TIME: &str = "LastAccessTime";
    pub const LAST_WRITE_TIME: &str = "LastWriteTime";
    pub const ATTRIBUTES: &str = "Attributes";
    pub const OWNER: &str = "Owner";
    pub const USER_RIGHTS: &str = "UserRights";
}

/// A single immutable name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: CompactString,
    pub value: CompactString,
}

impl Attribute {
    pub fn new(name: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered attribute list.
///
/// Lookups return `Option<&str>`: `None` means the attribute is absent,
/// `Some("")` means it is present with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append an attribute, keeping any earlier one with the same name.
    pub fn push(&mut self, name: impl Into<CompactString>, value: impl Into<CompactString>) {
        self.0.push(Attribute::new(name, value));
    }

    /// Replace the first attribute called `name`, or append it.
    pub fn set(&mut self, name: &str, value: impl Into<CompactString>) {
        match self.0.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value.into(),
            None => self.0.push(Attribute::new(name, value)),
        }
    }

    /// Value of the first attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The `Size` attribute parsed as a byte count.
    ///
    /// Returns `None` when the attribute is absent or not a number.
    pub fn size(&self) -> Option<u64> {
        self.get(names::SIZE).and_then(|v| v.parse().ok())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_is_distinct_from_empty() {
        let mut attrs = Attributes::new();
        attrs.push("Owner", "");
        assert_eq!(attrs.get("Owner"), Some(""));
        assert_eq!(attrs.get("UserRights"), None);
        assert!(attrs.contains("Owner"));
        assert!(!attrs.contains("UserRights"));
    }

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut attrs = Attributes::new();
        attrs.push("Name", "root");
        attrs.push("Size", "0");
        attrs.push("Owner", "alice");
        attrs.set("Size", "42");
        attrs.set("UserRights", "Allow: Read;");

        let order: Vec<&str> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(order, ["Name", "Size", "Owner", "UserRights"]);
        assert_eq!(attrs.size(), Some(42));
    }

    #[test]
    fn size_ignores_non_numeric_values() {
        let mut attrs = Attributes::new();
        attrs.push("Size", "lots");
        assert_eq!(attrs.size(), None);
        assert_eq!(Attributes::new().size(), None);
    }
}
