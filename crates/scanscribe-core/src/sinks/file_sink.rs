/// Streams the record sequence to an XML-like file, backpatching directory
/// sizes in place.
///
/// A directory's size is only known at its `Update`, long after its opening
/// tag was written. The opening tag therefore carries a fixed-width run of
/// zeros; its offset is pushed on a stack and, when the matching `Update`
/// arrives, the digits are written right-aligned over the placeholder and
/// the writer seeks back to the end of the file.
///
/// ```text
/// <dir Name="root" ... Size="0000000000000001234" >
///     <file Name="a.txt" ... Size="1234" />
/// </dir>
/// ```
use crate::error::ScanError;
use crate::model::{names, Attributes, Record, RecordKind};
use crate::pipeline::{CancelToken, Outcome, RecordProcessor};
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Width of the zero-filled directory size placeholder. Holds any `u64`.
pub const SIZE_FIELD_WIDTH: usize = 19;

const PLACEHOLDER: &[u8; SIZE_FIELD_WIDTH] = b"0000000000000000000";

/// File sink processor, run by a [`crate::pipeline::QueuedConsumer`].
pub struct XmlFileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    /// Whether this sink created the file (and may therefore delete it).
    created: bool,
    /// Placeholder offsets of the currently open directories.
    open_dirs: Vec<u64>,
}

impl XmlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            created: false,
            open_dirs: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, err: io::Error) -> ScanError {
        ScanError::io(&self.path, err)
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ScanError> {
        if self.writer.is_none() {
            let file = File::create(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
            self.created = true;
            debug!("Created {}", self.path.display());
            self.writer = Some(BufWriter::new(file));
        }
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(ScanError::InvalidState("file sink writer missing")),
        }
    }

    fn write_add(&mut self, record: &Record) -> Result<(), ScanError> {
        let depth = self.open_dirs.len();
        let mut line = String::with_capacity(256);
        push_indent(&mut line, depth);
        line.push('<');
        line.push_str(if record.is_directory { "dir" } else { "file" });
        push_attribute(&mut line, names::NAME, &record.name);
        push_attributes(&mut line, &record.attributes, record.is_directory);

        if !record.is_directory {
            line.push_str(" />\n");
            return self
                .writer()?
                .write_all(line.as_bytes())
                .map_err(|e| ScanError::io(&self.path, e));
        }

        line.push_str(" Size=\"");
        let offset = {
            let writer = self.writer()?;
            writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.stream_position())
        }
        .map_err(|e| self.io_err(e))?;
        self.open_dirs.push(offset);
        let writer = self.writer()?;
        writer
            .write_all(PLACEHOLDER)
            .and_then(|()| writer.write_all(b"\" >\n"))
            .map_err(|e| ScanError::io(&self.path, e))
    }

    fn write_update(&mut self, record: &Record) -> Result<(), ScanError> {
        let offset = self
            .open_dirs
            .pop()
            .ok_or(ScanError::UnbalancedStream("directory update without an open directory"))?;

        let mut line = String::with_capacity(16);
        push_indent(&mut line, self.open_dirs.len());
        line.push_str("</dir>\n");
        self.writer()?
            .write_all(line.as_bytes())
            .map_err(|e| ScanError::io(&self.path, e))?;

        let Some(size) = record.attributes.get(names::SIZE) else {
            return Ok(());
        };
        let digits = size_digits(size)?;
        let path = self.path.clone();
        let writer = self.writer()?;
        patch_size(writer, offset, digits).map_err(|e| ScanError::io(&path, e))
    }

    /// Drop the writer and remove the file, if this sink created it.
    fn discard(&mut self) -> Result<(), ScanError> {
        self.writer = None;
        self.open_dirs.clear();
        if !self.created {
            return Ok(());
        }
        self.created = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed partial output {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }

    /// `discard` on a path that already reports another error.
    fn discard_logged(&mut self) {
        if let Err(err) = self.discard() {
            warn!("Failed to remove partial output: {err}");
        }
    }
}

impl RecordProcessor for XmlFileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn process_record(&mut self, record: &Arc<Record>, _cancel: &CancelToken) -> Result<(), ScanError> {
        match record.kind {
            RecordKind::Add => self.write_add(record),
            RecordKind::Update => self.write_update(record),
        }
    }

    fn finalize(&mut self, outcome: Outcome) -> Result<(), ScanError> {
        match outcome {
            Outcome::Completed => {
                if !self.open_dirs.is_empty() {
                    self.discard_logged();
                    return Err(ScanError::UnbalancedStream("directories left open at completion"));
                }
                if let Some(mut writer) = self.writer.take() {
                    if let Err(err) = writer.flush() {
                        let err = self.io_err(err);
                        self.discard_logged();
                        return Err(err);
                    }
                }
                debug!("Finished writing {}", self.path.display());
                Ok(())
            }
            Outcome::Cancelled | Outcome::Failed => self.discard(),
        }
    }
}

impl Drop for XmlFileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("Failed to flush {}: {err}", self.path.display());
            }
        }
    }
}

/// Validate a `Size` value for the placeholder.
fn size_digits(size: &str) -> Result<&str, ScanError> {
    if size.is_empty() || size.len() > SIZE_FIELD_WIDTH || !size.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScanError::SizeFieldOverflow {
            value: size.to_owned(),
            width: SIZE_FIELD_WIDTH,
        });
    }
    Ok(size)
}

/// Overwrite the tail of the placeholder at `offset` with `digits`, then
/// return to the end of the stream.
fn patch_size<W: Write + Seek>(writer: &mut W, offset: u64, digits: &str) -> io::Result<()> {
    let end = writer.stream_position()?;
    let pad = (SIZE_FIELD_WIDTH - digits.len()) as u64;
    writer.seek(SeekFrom::Start(offset + pad))?;
    writer.write_all(digits.as_bytes())?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

fn push_indent(line: &mut String, depth: usize) {
    for _ in 0..depth {
        line.push('\t');
    }
}

/// Append every attribute except `Name`, and except `Size` on directories
/// where the placeholder carries it.
fn push_attributes(line: &mut String, attributes: &Attributes, is_directory: bool) {
    for attr in attributes {
        if attr.name == names::NAME || (is_directory && attr.name == names::SIZE) {
            continue;
        }
        push_attribute(line, &attr.name, &attr.value);
    }
}

fn push_attribute(line: &mut String, name: &str, value: &str) {
    line.push(' ');
    line.push_str(name);
    line.push_str("=\"");
    escape_into(line, value);
    line.push('"');
}

fn escape_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
}
