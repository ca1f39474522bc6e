/// Arena-backed live document mirroring the streamed file's nesting.
///
/// The tree sink builds it element by element while the scan runs; the
/// owner thread reads it concurrently for display. Because the scan is
/// pre-order, every child is inserted after its parent, which makes the
/// bottom-up size pass in [`TreeDocument::computed_sizes`] a single reverse
/// sweep over the arena.
use super::attribute::{names, Attributes};
use super::element::{Element, ElementKind, NodeIndex};
use super::size::format_size;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt::Write as _;
use std::sync::Arc;

/// The in-memory tree produced by a scan.
#[derive(Debug, Clone, Default)]
pub struct TreeDocument {
    /// Arena: every element in a flat vector.
    pub nodes: Vec<Element>,

    root: Option<NodeIndex>,
}

impl TreeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty document with pre-allocated capacity.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(estimated_nodes),
            root: None,
        }
    }

    /// Create a document whose root `dir` element already exists, the way a
    /// front end prepares the document before handing it to a scan.
    pub fn with_root(name: &str) -> Self {
        let mut doc = Self::new();
        doc.ensure_root(name);
        doc
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    /// Return the root element, creating it if needed, and set its `Name`.
    pub fn ensure_root(&mut self, name: &str) -> NodeIndex {
        match self.root {
            Some(root) => {
                self.nodes[root.idx()].attributes.set(names::NAME, name);
                root
            }
            None => {
                let root = self.add_node(Element::new(ElementKind::Dir, name));
                self.root = Some(root);
                root
            }
        }
    }

    /// Allocate a new element in the arena and return its index.
    pub fn add_node(&mut self, element: Element) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(element);
        idx
    }

    /// Attach `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        match self.nodes[parent.idx()].last_child {
            Some(last) => self.nodes[last.idx()].next_sibling = Some(child),
            None => self.nodes[parent.idx()].first_child = Some(child),
        }
        self.nodes[parent.idx()].last_child = Some(child);
        self.nodes[child.idx()].parent = Some(parent);
    }

    /// Create an element carrying `Name` plus `attributes` and append it
    /// under `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeIndex,
        kind: ElementKind,
        name: &str,
        attributes: &Attributes,
    ) -> NodeIndex {
        let mut element = Element::new(kind, name);
        for attr in attributes {
            element.attributes.push(attr.name.clone(), attr.value.clone());
        }
        let idx = self.add_node(element);
        self.append_child(parent, idx);
        idx
    }

    /// Set each of `attributes` on an element, replacing same-named values.
    pub fn merge_attributes(&mut self, index: NodeIndex, attributes: &Attributes) {
        let target = &mut self.nodes[index.idx()].attributes;
        for attr in attributes {
            target.set(&attr.name, attr.value.clone());
        }
    }

    /// Get the element at the given index.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &Element {
        &self.nodes[index.idx()]
    }

    /// Direct children in insertion order.
    pub fn children(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        let mut children = Vec::new();
        let mut child = self.nodes[parent.idx()].first_child;
        while let Some(idx) = child {
            children.push(idx);
            child = self.nodes[idx.idx()].next_sibling;
        }
        children
    }

    /// First direct child called `name`.
    pub fn child_by_name(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.children(parent)
            .into_iter()
            .find(|&c| self.nodes[c.idx()].name() == name)
    }

    /// Reconstruct the slash-separated path of an element from the root.
    pub fn full_path(&self, index: NodeIndex) -> String {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            segments.push(self.nodes[idx.idx()].name());
            current = self.nodes[idx.idx()].parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Subtree byte totals recomputed from file `Size` attributes.
    ///
    /// Reverse pass: children are always stored after their parent, so every
    /// child is folded into its parent before the parent is folded upward.
    pub fn computed_sizes(&self) -> Vec<u64> {
        let mut sizes = vec![0u64; self.nodes.len()];
        for i in (0..self.nodes.len()).rev() {
            let node = &self.nodes[i];
            if !node.is_dir() {
                sizes[i] = node.size().unwrap_or(0);
            }
            if let Some(parent) = node.parent {
                sizes[parent.idx()] = sizes[parent.idx()].saturating_add(sizes[i]);
            }
        }
        sizes
    }

    /// Directories whose stored `Size` disagrees with the recomputed total.
    ///
    /// Directories without a `Size` (listing denied) are not checked.
    pub fn size_mismatches(&self) -> Vec<NodeIndex> {
        let computed = self.computed_sizes();
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, node)| {
                node.is_dir() && node.size().is_some_and(|stored| stored != computed[*i])
            })
            .map(|(i, _)| NodeIndex::new(i))
            .collect()
    }

    /// Indented text outline of the document, down to `max_depth` levels
    /// below the root.
    pub fn outline(&self, max_depth: usize) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.outline_node(root, 0, max_depth, &mut out);
        }
        out
    }

    fn outline_node(&self, index: NodeIndex, depth: usize, max_depth: usize, out: &mut String) {
        let node = self.node(index);
        let size = match node.size() {
            Some(bytes) => format_size(bytes),
            None => "?".to_owned(),
        };
        let suffix = if node.is_dir() { "/" } else { "" };
        let _ = writeln!(out, "{}{}{}  {}", "  ".repeat(depth), node.name(), suffix, size);
        if depth < max_depth {
            for child in self.children(index) {
                self.outline_node(child, depth + 1, max_depth, out);
            }
        }
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the document contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A document shared between the tree sink and the thread that owns it.
///
/// The owner thread takes read locks to display the tree. Mutations happen
/// only inside jobs marshaled onto the owner thread, and each marshaled call
/// is bracketed by the edit gate so at most one is in flight per document.
#[derive(Debug, Default)]
pub struct LiveDocument {
    tree: RwLock<TreeDocument>,
    edit_gate: Mutex<()>,
}

/// Handle to a live document.
pub type SharedDocument = Arc<LiveDocument>;

impl LiveDocument {
    pub fn new(tree: TreeDocument) -> SharedDocument {
        Arc::new(Self {
            tree: RwLock::new(tree),
            edit_gate: Mutex::new(()),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TreeDocument> {
        self.tree.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TreeDocument> {
        self.tree.write()
    }

    /// Exclusive region spanning one marshaled mutation.
    pub(crate) fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edit_gate.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(size: u64) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.push(names::SIZE, size.to_string());
        attrs
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut doc = TreeDocument::with_root("root");
        let root = doc.root().unwrap();
        let a = doc.append_element(root, ElementKind::File, "a", &Attributes::new());
        let b = doc.append_element(root, ElementKind::Dir, "b", &Attributes::new());
        let c = doc.append_element(root, ElementKind::File, "c", &Attributes::new());

        assert_eq!(doc.children(root), vec![a, b, c]);
        assert_eq!(doc.child_by_name(root, "b"), Some(b));
        assert_eq!(doc.full_path(b), "root/b");
    }

    #[test]
    fn ensure_root_renames_existing_root() {
        let mut doc = TreeDocument::with_root("placeholder");
        let root = doc.ensure_root("data");
        assert_eq!(doc.root(), Some(root));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.node(root).name(), "data");
    }

    #[test]
    fn computed_sizes_roll_up_files() {
        // root -> dir -> (a: 100, b: 200), c: 50
        let mut doc = TreeDocument::with_root("root");
        let root = doc.root().unwrap();
        let dir = doc.append_element(root, ElementKind::Dir, "dir", &Attributes::new());
        doc.append_element(dir, ElementKind::File, "a", &sized(100));
        doc.append_element(dir, ElementKind::File, "b", &sized(200));
        doc.append_element(root, ElementKind::File, "c", &sized(50));

        let sizes = doc.computed_sizes();
        assert_eq!(sizes[dir.idx()], 300);
        assert_eq!(sizes[root.idx()], 350);
    }

    #[test]
    fn size_mismatches_skips_unsized_directories() {
        let mut doc = TreeDocument::with_root("root");
        let root = doc.root().unwrap();
        let denied = doc.append_element(root, ElementKind::Dir, "denied", &Attributes::new());
        doc.append_element(root, ElementKind::File, "f", &sized(10));
        doc.merge_attributes(root, &sized(10));
        assert!(doc.size_mismatches().is_empty());

        doc.merge_attributes(denied, &sized(7));
        assert_eq!(doc.size_mismatches(), vec![denied]);
    }

    #[test]
    fn outline_respects_depth() {
        let mut doc = TreeDocument::with_root("root");
        let root = doc.root().unwrap();
        let sub = doc.append_element(root, ElementKind::Dir, "sub", &Attributes::new());
        doc.append_element(sub, ElementKind::File, "deep.txt", &sized(1));

        let shallow = doc.outline(1);
        assert!(shallow.contains("sub/"));
        assert!(!shallow.contains("deep.txt"));
        assert!(doc.outline(2).contains("    deep.txt  1 B"));
    }
}
