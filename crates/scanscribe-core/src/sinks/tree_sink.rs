/// Mirrors the record stream into a [`LiveDocument`] on its owner thread.
///
/// Each record becomes one marshaled mutation. The cursor (current element
/// plus the stack of saved parents) travels into the job and back out, so
/// only the owner thread ever touches the document while a scan runs. A
/// mutation abandoned on cancellation is never applied.
use crate::error::ScanError;
use crate::model::{names, Attributes, ElementKind, NodeIndex, Record, RecordKind, SharedDocument, TreeDocument};
use crate::pipeline::{CancelToken, Outcome, RecordProcessor};
use crate::sinks::dispatcher::Dispatcher;
use std::sync::Arc;
use tracing::debug;

/// Position of the tree sink in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeCursor {
    /// `None` until the root record arrived.
    current: Option<NodeIndex>,
    parents: Vec<NodeIndex>,
}

impl TreeCursor {
    pub fn current(&self) -> Option<NodeIndex> {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Apply one record to `doc`.
    pub fn apply(&mut self, doc: &mut TreeDocument, record: &Record) -> Result<(), ScanError> {
        let Some(current) = self.current else {
            return self.apply_root(doc, record);
        };

        match record.kind {
            RecordKind::Add => {
                let kind = ElementKind::from_is_directory(record.is_directory);
                let child = doc.append_element(current, kind, &record.name, &record.attributes);
                if record.is_directory {
                    self.parents.push(current);
                    self.current = Some(child);
                }
            }
            RecordKind::Update => {
                if let Some(size) = record.attributes.get(names::SIZE) {
                    let mut attrs = Attributes::with_capacity(1);
                    attrs.push(names::SIZE, size);
                    doc.merge_attributes(current, &attrs);
                }
                if let Some(parent) = self.parents.pop() {
                    self.current = Some(parent);
                }
            }
        }
        Ok(())
    }

    fn apply_root(&mut self, doc: &mut TreeDocument, record: &Record) -> Result<(), ScanError> {
        if record.kind != RecordKind::Add || !record.is_directory {
            return Err(ScanError::UnbalancedStream("first record must add the root directory"));
        }
        let root = doc.ensure_root(&record.name);
        doc.merge_attributes(root, &record.attributes);
        self.current = Some(root);
        Ok(())
    }
}

/// Tree sink processor, run by a [`crate::pipeline::QueuedConsumer`].
pub struct TreeSink {
    document: SharedDocument,
    dispatcher: Dispatcher,
    /// Taken while a marshaled job holds it.
    cursor: Option<TreeCursor>,
}

impl TreeSink {
    pub fn new(document: SharedDocument, dispatcher: Dispatcher) -> Self {
        Self {
            document,
            dispatcher,
            cursor: Some(TreeCursor::default()),
        }
    }
}

impl RecordProcessor for TreeSink {
    fn name(&self) -> &str {
        "tree"
    }

    fn process_record(&mut self, record: &Arc<Record>, cancel: &CancelToken) -> Result<(), ScanError> {
        let mut cursor = self
            .cursor
            .take()
            .ok_or(ScanError::InvalidState("tree cursor lost by an abandoned update"))?;

        let _edit = self.document.lock_edits();
        let document = Arc::clone(&self.document);
        let record = Arc::clone(record);
        let (cursor, applied) = self.dispatcher.invoke(cancel, move || {
            let applied = cursor.apply(&mut document.write(), &record);
            (cursor, applied)
        })?;
        self.cursor = Some(cursor);
        applied
    }

    fn finalize(&mut self, outcome: Outcome) -> Result<(), ScanError> {
        debug!("Tree sink finished: {outcome:?}");
        Ok(())
    }
}
