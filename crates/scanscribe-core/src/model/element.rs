/// A single element in the arena-allocated live document.
///
/// Elements are stored in a flat `Vec<Element>`. Parent/child links use
/// indices rather than pointers, which keeps the document `Send + Sync`
/// without reference counting and lets the owner thread read it under a
/// plain `RwLock`.
use super::attribute::{names, Attributes};

/// Lightweight index into the arena `Vec<Element>`.
///
/// Uses `u32` to keep elements small: supports up to ~4 billion entries,
/// which is more than enough for any real filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Element tag, mirroring the tags of the streamed file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Dir,
    File,
}

impl ElementKind {
    pub fn from_is_directory(is_directory: bool) -> Self {
        if is_directory {
            Self::Dir
        } else {
            Self::File
        }
    }

    /// Tag name used in both the file and the live document.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::File => "file",
        }
    }
}

/// One `dir` or `file` element.
///
/// Children are linked via `first_child` / `next_sibling`; `last_child`
/// makes appends O(1) so children keep their arrival order.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,

    /// Attributes in arrival order. `Name` is always first.
    pub attributes: Attributes,

    /// Index of the parent element. `None` for the document root.
    pub parent: Option<NodeIndex>,

    pub first_child: Option<NodeIndex>,
    pub last_child: Option<NodeIndex>,
    pub next_sibling: Option<NodeIndex>,
}

impl Element {
    /// Create an unlinked element carrying only its `Name`.
    pub fn new(kind: ElementKind, name: &str) -> Self {
        let mut attributes = Attributes::with_capacity(8);
        attributes.push(names::NAME, name);
        Self {
            kind,
            attributes,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
        }
    }

    pub fn name(&self) -> &str {
        self.attributes.get(names::NAME).unwrap_or_default()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ElementKind::Dir
    }

    /// Stored `Size` attribute, if any.
    pub fn size(&self) -> Option<u64> {
        self.attributes.size()
    }
}
