/// Depth-first directory walker, the single producer of the record stream.
///
/// The walk runs on one named thread. Directories are listed once,
/// subdirectories are visited before files, and each directory's `Update`
/// follows its whole subtree, so `Add` records arrive in pre-order and
/// `Update` records in post-order.
///
/// # Recoverable conditions
///
/// A directory that cannot be listed (access denied, or removed or replaced
/// by a file since its parent was listed) is closed at once with a size-less `Update` and
/// contributes nothing to its parent. An entry that vanishes or cannot be
/// stat'ed between listing and probing is skipped. Every other I/O error
/// ends the walk with `failed`.
use crate::error::ScanError;
use crate::model::Record;
use crate::pipeline::{CancelToken, ProducerEvents, RecordProducer};
use crate::platform::MetadataProbe;
use compact_str::CompactString;
use parking_lot::Mutex;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Filesystem producer.
pub struct ScanProducer {
    root: PathBuf,
    probe: Arc<dyn MetadataProbe>,
    include_hidden: bool,
    cancel: CancelToken,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScanProducer {
    pub fn new(root: impl Into<PathBuf>, probe: Arc<dyn MetadataProbe>, include_hidden: bool) -> Self {
        Self {
            root: root.into(),
            probe,
            include_hidden,
            cancel: CancelToken::new(),
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordProducer for ScanProducer {
    fn start(&self, events: Arc<dyn ProducerEvents>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let walker = Walker {
            probe: Arc::clone(&self.probe),
            include_hidden: self.include_hidden,
            cancel: self.cancel.clone(),
            events: Arc::clone(&events),
        };
        let root = self.root.clone();
        let spawned = thread::Builder::new()
            .name("scanscribe-producer".into())
            .spawn(move || walker.run(&root));
        match spawned {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(source) => {
                error!("Failed to spawn producer thread: {source}");
                events.failed(ScanError::Spawn {
                    thread: "scanscribe-producer".into(),
                    source,
                });
            }
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Producer thread panicked");
            }
        }
    }
}

/// One entry of a directory listing.
struct Entry {
    name: CompactString,
    path: PathBuf,
}

/// Walker state owned by the producer thread.
struct Walker {
    probe: Arc<dyn MetadataProbe>,
    include_hidden: bool,
    cancel: CancelToken,
    events: Arc<dyn ProducerEvents>,
}

impl Walker {
    fn run(&self, root: &Path) {
        info!("Starting scan of {}", root.display());
        let start = Instant::now();
        match self.walk(root) {
            Ok(total) => {
                if self.cancel.is_cancelled() {
                    return;
                }
                info!(
                    "Walk finished in {:.2}s: {} bytes",
                    start.elapsed().as_secs_f64(),
                    total
                );
                self.events.completed();
            }
            Err(ScanError::Cancelled) => debug!("Walk cancelled"),
            Err(err) => {
                if !self.cancel.is_cancelled() {
                    self.events.failed(err);
                }
            }
        }
    }

    /// Emit the root and walk below it. Returns the total byte count.
    fn walk(&self, root: &Path) -> Result<u64, ScanError> {
        let metadata = fs::metadata(root).map_err(|e| ScanError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        let name = CompactString::new(root_display_name(root));
        self.emit(Record::add_directory(name.clone(), self.probe.probe(root, &metadata)))?;
        self.visit_directory(root, &name)
    }

    /// Produce everything below `path` (whose `Add` was already emitted),
    /// then its `Update`. Returns the subtree byte count.
    fn visit_directory(&self, path: &Path, name: &CompactString) -> Result<u64, ScanError> {
        self.cancel.check()?;

        let (dirs, files) = match self.list(path) {
            Ok(listing) => listing,
            Err(err) if err.is_skippable() => {
                warn!("Skipping contents of {}: {err}", path.display());
                self.emit(Record::update_directory(name.clone(), None))?;
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let mut total: u64 = 0;
        for dir in dirs {
            self.cancel.check()?;
            let Some(metadata) = self.stat(&dir.path)? else {
                continue;
            };
            let attrs = self.probe.probe(&dir.path, &metadata);
            self.emit(Record::add_directory(dir.name.clone(), attrs))?;
            total = total.saturating_add(self.visit_directory(&dir.path, &dir.name)?);
        }

        for file in files {
            self.cancel.check()?;
            let Some(metadata) = self.stat(&file.path)? else {
                continue;
            };
            let attrs = self.probe.probe(&file.path, &metadata);
            total = total.saturating_add(metadata.len());
            self.emit(Record::add_file(file.name, attrs))?;
        }

        self.emit(Record::update_directory(name.clone(), Some(total)))?;
        Ok(total)
    }

    /// List `path` once, split into subdirectories and everything else, each
    /// in listing order. Symbolic links are not followed and count as files.
    fn list(&self, path: &Path) -> Result<(Vec<Entry>, Vec<Entry>), ScanError> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| ScanError::io(path, e))? {
            let entry = entry.map_err(|e| ScanError::io(path, e))?;
            let name = CompactString::new(entry.file_name().to_string_lossy());
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            let entry = Entry {
                name,
                path: entry.path(),
            };
            if is_dir {
                dirs.push(entry);
            } else {
                files.push(entry);
            }
        }
        Ok((dirs, files))
    }

    /// Metadata of a listed entry, or `None` if it should be skipped.
    fn stat(&self, path: &Path) -> Result<Option<Metadata>, ScanError> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                let err = ScanError::io(path, e);
                if err.is_skippable() {
                    warn!("Skipping {err}");
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn emit(&self, record: Record) -> Result<(), ScanError> {
        self.cancel.check()?;
        self.events.produced(record);
        Ok(())
    }
}

/// Display name of the scan root: the final path component, or the whole
/// path for roots such as `/` or `C:\`.
pub fn root_display_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        name.to_string_lossy().to_string()
    } else {
        let s = path.to_string_lossy();
        let trimmed = s.trim_end_matches(['\\', '/']);
        if trimmed.is_empty() {
            s.to_string()
        } else {
            trimmed.to_string()
        }
    }
}
