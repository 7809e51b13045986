//! # Archive Format
//!
//! Defines the on-disk layout and the [`Assembler`] that turns an unordered
//! stream of chunk results into it.
//!
//! All integers are big-endian. There is no global header or footer; the
//! archive is a plain sequence of file blocks:
//!
//! ```text
//! FileBlock   ::= NameHeader ChunkRecord{chunk_count}
//! NameHeader  ::= name_len:u16 | name:utf8[name_len] | flags:u8 | chunk_count:u32
//! ChunkRecord ::= payload_len:u32 | payload[payload_len]
//! ```
//!
//! A file's records always follow its own header contiguously, in ascending
//! chunk index order. `FLAG_INCOMPLETE` marks a block with at least one chunk
//! missing because it failed to read or compress.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::common::{ChunkOutcome, ChunkResult};
use crate::error::{ArchiverError, Result};
use crate::plan::ChunkPlan;

/// Set when one or more chunks of the file are missing from its block.
pub const FLAG_INCOMPLETE: u8 = 0b0000_0001;
/// Bytes of a name header that are not the name itself.
pub const NAME_HEADER_FIXED_LEN: u64 = 2 + 1 + 4;
/// Bytes of a chunk record that are not the payload.
pub const CHUNK_RECORD_FIXED_LEN: u64 = 4;

/// Low-level, append-only writer for file blocks.
pub struct ArchiveWriter<W: Write> {
    writer: BufWriter<W>,
    bytes_written: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        // use 8 MiB buffer to reduce syscall overhead during block writes
        Self {
            writer: BufWriter::with_capacity(8 * 1024 * 1024, inner),
            bytes_written: 0,
        }
    }

    pub fn write_name_header(&mut self, name: &str, flags: u8, chunk_count: u32) -> io::Result<()> {
        let name_len = u16::try_from(name.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "archive name longer than 65535 bytes"))?;
        self.writer.write_all(&name_len.to_be_bytes())?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(&[flags])?;
        self.writer.write_all(&chunk_count.to_be_bytes())?;
        self.bytes_written += NAME_HEADER_FIXED_LEN + name.len() as u64;
        Ok(())
    }

    pub fn write_chunk_record(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk payload larger than 4 GiB"))?;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.bytes_written += CHUNK_RECORD_FIXED_LEN + payload.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes buffered bytes and returns the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Reassembly state for one file whose chunks are still arriving.
#[derive(Debug)]
struct PendingFile {
    expected: u32,
    received: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    failed: Vec<u32>,
}

impl PendingFile {
    fn new(expected: u32) -> Self {
        Self {
            expected,
            received: 0,
            chunks: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

/// What happened to one file once all of its chunks were accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDisposition {
    /// Block written with every chunk.
    Written,
    /// Block written and flagged; the listed chunk indices are missing.
    Incomplete(Vec<u32>),
    /// Every chunk failed, so no block was written.
    Omitted,
}

/// Summary of what the assembler wrote.
#[derive(Debug, Default, Clone)]
pub struct AssemblyReport {
    pub files_written: u64,
    pub incomplete_files: Vec<String>,
    pub omitted_files: Vec<String>,
    pub bytes_written: u64,
}

/// Consumes chunk results in any order and writes complete file blocks.
///
/// Each file's payloads are buffered, keyed by chunk index, until every planned
/// chunk of that file has either arrived or failed; the block is then written
/// in one burst. Memory is therefore bounded by the compressed size of the
/// files currently in flight, never the whole archive.
pub struct Assembler<W: Write> {
    writer: ArchiveWriter<W>,
    expected: HashMap<Arc<str>, u32>,
    pending: HashMap<Arc<str>, PendingFile>,
    report: AssemblyReport,
}

impl<W: Write> Assembler<W> {
    pub fn new(inner: W, plan: &ChunkPlan) -> Result<Self> {
        let mut expected = HashMap::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            let count = entry.chunk_count(plan.chunk_size);
            let count = u32::try_from(count).map_err(|_| ArchiverError::TooManyChunks {
                path: entry.path.clone(),
                chunks: count,
            })?;
            expected.insert(Arc::clone(&entry.archive_name), count);
        }
        Ok(Self {
            writer: ArchiveWriter::new(inner),
            expected,
            pending: HashMap::new(),
            report: AssemblyReport::default(),
        })
    }

    /// Number of files with buffered, unwritten chunks.
    pub fn pending_files(&self) -> usize {
        self.pending.len()
    }

    /// Takes one result. Returns the file's disposition when this result
    /// completed it, `None` while the file is still waiting for chunks.
    pub fn accept(&mut self, result: ChunkResult) -> Result<Option<FileDisposition>> {
        let ChunkResult { archive_name, chunk_index, outcome } = result;
        let &expected = self.expected.get(&archive_name).ok_or_else(|| {
            ArchiverError::Protocol(format!("result for unplanned file '{}'", archive_name))
        })?;
        if chunk_index >= expected {
            return Err(ArchiverError::Protocol(format!(
                "chunk {} of '{}' is out of range (file has {} chunks)",
                chunk_index, archive_name, expected
            )));
        }

        let file = self
            .pending
            .entry(Arc::clone(&archive_name))
            .or_insert_with(|| PendingFile::new(expected));
        if file.chunks.contains_key(&chunk_index) || file.failed.contains(&chunk_index) {
            return Err(ArchiverError::Protocol(format!(
                "chunk {} of '{}' delivered twice",
                chunk_index, archive_name
            )));
        }
        match outcome {
            ChunkOutcome::Compressed { payload, .. } => {
                file.chunks.insert(chunk_index, payload);
            }
            ChunkOutcome::Failed(_) => file.failed.push(chunk_index),
        }
        file.received += 1;

        if !file.is_complete() {
            return Ok(None);
        }
        let file = self
            .pending
            .remove(&archive_name)
            .ok_or_else(|| ArchiverError::Protocol("pending file vanished".into()))?;
        // Writing a name the second time would break the contiguity invariant.
        self.expected.remove(&archive_name);
        self.flush_file(&archive_name, file).map(Some)
    }

    fn flush_file(&mut self, name: &str, mut file: PendingFile) -> Result<FileDisposition> {
        if file.chunks.is_empty() {
            warn!("{}: every chunk failed, file omitted from archive", name);
            self.report.omitted_files.push(name.to_string());
            return Ok(FileDisposition::Omitted);
        }

        let flags = if file.failed.is_empty() { 0 } else { FLAG_INCOMPLETE };
        self.writer.write_name_header(name, flags, file.chunks.len() as u32)?;
        // BTreeMap iterates in ascending chunk index order
        for payload in file.chunks.values() {
            self.writer.write_chunk_record(payload)?;
        }
        self.report.files_written += 1;
        debug!(name, chunks = file.chunks.len(), "file block written");

        if file.failed.is_empty() {
            Ok(FileDisposition::Written)
        } else {
            file.failed.sort_unstable();
            warn!("{}: written incomplete, missing chunks {:?}", name, file.failed);
            self.report.incomplete_files.push(name.to_string());
            Ok(FileDisposition::Incomplete(file.failed))
        }
    }

    /// Flushes the output. Fails if any planned file never completed.
    pub fn finish(mut self) -> Result<(AssemblyReport, W)> {
        if let Some(name) = self.expected.keys().next() {
            return Err(ArchiverError::Protocol(format!(
                "{} file(s) never completed, first: '{}'",
                self.expected.len(),
                name
            )));
        }
        self.report.bytes_written = self.writer.bytes_written();
        let inner = self.writer.finish()?;
        Ok((self.report, inner))
    }
}
