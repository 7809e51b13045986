//! # Extraction Module
//!
//! Sequential decoder for chunkzip archives. [`ArchiveReader`] walks the file
//! blocks in order; [`list_archive`] and [`extract_archive`] build on it.
//!
//! The reader relies on the `chunk_count` field of every name header to know
//! where one file's records stop and the next header starts.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{CHUNK_RECORD_FIXED_LEN, FLAG_INCOMPLETE, NAME_HEADER_FIXED_LEN};
use crate::codec::Codec;
use crate::error::{ArchiverError, Result};

/// One decoded file block, chunks still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub name: String,
    pub incomplete: bool,
    pub chunks: Vec<Vec<u8>>,
    /// Byte offset of the block's name header within the archive.
    pub offset: u64,
}

impl FileBlock {
    pub fn compressed_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// Decompresses and concatenates the chunks in archive order.
    pub fn decode(&self, codec: &dyn Codec) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let data = codec.decompress(chunk).map_err(|e| {
                ArchiverError::Format(format!("'{}' chunk {}: {} decode failed: {}", self.name, i, codec.name(), e))
            })?;
            out.extend_from_slice(&data);
        }
        Ok(out)
    }
}

/// Iterates over the file blocks of an archive stream.
///
/// Stops after the first error; a malformed archive cannot be resynchronised.
pub struct ArchiveReader<R: Read> {
    reader: R,
    offset: u64,
    done: bool,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0, done: false }
    }

    /// Reads the next block's header and record lengths, skipping the payloads.
    ///
    /// Shares its position with the iterator, so the two can be mixed; after
    /// the last block or the first error it keeps returning `Ok(None)`.
    pub fn next_entry(&mut self) -> Result<Option<ListEntry>> {
        if self.done {
            return Ok(None);
        }
        let entry = self.skip_block();
        if !matches!(entry, Ok(Some(_))) {
            self.done = true;
        }
        entry
    }

    fn skip_block(&mut self) -> Result<Option<ListEntry>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let mut compressed_bytes = 0;
        for i in 0..header.chunk_count {
            let len = self.read_chunk_len()?;
            let skipped = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
            self.offset += skipped;
            if skipped != len {
                return Err(truncated_chunk(&header.name, i, len, skipped));
            }
            compressed_bytes += len;
        }
        Ok(Some(ListEntry {
            incomplete: header.incomplete(),
            chunks: header.chunk_count as usize,
            compressed_bytes,
            offset: header.offset,
            name: header.name,
        }))
    }

    fn read_block(&mut self) -> Result<Option<FileBlock>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };

        let mut chunks = Vec::with_capacity(header.chunk_count.min(1024) as usize);
        for i in 0..header.chunk_count {
            let len = self.read_chunk_len()?;
            // read through `take` so a corrupt length cannot force a huge allocation up front
            let mut payload = Vec::new();
            let got = (&mut self.reader).take(len).read_to_end(&mut payload)? as u64;
            self.offset += got;
            if got != len {
                return Err(truncated_chunk(&header.name, i, len, got));
            }
            chunks.push(payload);
        }

        Ok(Some(FileBlock {
            incomplete: header.incomplete(),
            chunks,
            offset: header.offset,
            name: header.name,
        }))
    }

    /// Reads one name header, or `None` on a clean end of archive.
    fn read_header(&mut self) -> Result<Option<BlockHeader>> {
        let start = self.offset;
        let Some(name_len) = self.read_name_len()? else {
            return Ok(None);
        };

        let mut name = vec![0u8; usize::from(name_len)];
        self.read_exact(&mut name, "name")?;
        let name = String::from_utf8(name)
            .map_err(|_| ArchiverError::Format(format!("name at offset {} is not valid UTF-8", start)))?;

        let mut fixed = [0u8; 5];
        self.read_exact(&mut fixed, "name header")?;
        let flags = fixed[0];
        let chunk_count = u32::from_be_bytes([fixed[1], fixed[2], fixed[3], fixed[4]]);
        if chunk_count == 0 {
            return Err(ArchiverError::Format(format!("'{}' has no chunk records", name)));
        }
        debug_assert_eq!(self.offset - start, NAME_HEADER_FIXED_LEN + u64::from(name_len));

        Ok(Some(BlockHeader { name, flags, chunk_count, offset: start }))
    }

    fn read_chunk_len(&mut self) -> Result<u64> {
        let mut len = [0u8; CHUNK_RECORD_FIXED_LEN as usize];
        self.read_exact(&mut len, "chunk length")?;
        Ok(u64::from(u32::from_be_bytes(len)))
    }

    /// Reads the 2-byte name length, or `None` on a clean end of archive.
    fn read_name_len(&mut self) -> Result<Option<u16>> {
        let mut buf = [0u8; 2];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(ArchiverError::Format(format!("truncated name header at offset {}", self.offset)))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.offset += 2;
        Ok(Some(u16::from_be_bytes(buf)))
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ArchiverError::Format(format!(
                "truncated {} at offset {}",
                what, self.offset
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

struct BlockHeader {
    name: String,
    flags: u8,
    chunk_count: u32,
    offset: u64,
}

impl BlockHeader {
    fn incomplete(&self) -> bool {
        self.flags & FLAG_INCOMPLETE != 0
    }
}

fn truncated_chunk(name: &str, index: u32, expected: u64, found: u64) -> ArchiverError {
    ArchiverError::Format(format!(
        "'{}' chunk {} truncated: expected {} bytes, found {}",
        name, index, expected, found
    ))
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<FileBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One line of `list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub chunks: usize,
    pub compressed_bytes: u64,
    pub incomplete: bool,
    /// Byte offset of the block within the archive.
    pub offset: u64,
}

/// Reads every block header of the archive at `path`. Payloads are skipped,
/// never buffered.
pub fn list_archive(path: &Path) -> Result<Vec<ListEntry>> {
    let file = File::open(path).map_err(|e| ArchiverError::io(e, path))?;
    let mut reader = ArchiveReader::new(BufReader::new(file));
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        entries.push(entry);
    }
    Ok(entries)
}

/// Result of an extraction run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExtractSummary {
    pub files_extracted: u64,
    pub bytes_written: u64,
    pub incomplete_files: Vec<String>,
    pub skipped_files: Vec<String>,
}

/// Extracts every file of `archive` below `output_dir`.
///
/// Blocks flagged incomplete are skipped unless `keep_incomplete` is set, in
/// which case they are written with their missing chunks simply absent.
pub fn extract_archive(
    archive: &Path,
    output_dir: &Path,
    codec: &dyn Codec,
    keep_incomplete: bool,
) -> Result<ExtractSummary> {
    let file = File::open(archive).map_err(|e| ArchiverError::io(e, archive))?;
    fs::create_dir_all(output_dir).map_err(|e| ArchiverError::io(e, output_dir))?;

    let mut summary = ExtractSummary::default();
    for block in ArchiveReader::new(BufReader::new(file)) {
        let block = block?;
        let target = safe_join(output_dir, &block.name)?;

        if block.incomplete {
            summary.incomplete_files.push(block.name.clone());
            if !keep_incomplete {
                warn!("{}: archived with missing chunks, skipped", block.name);
                summary.skipped_files.push(block.name);
                continue;
            }
            warn!("{}: archived with missing chunks, extracting what is present", block.name);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiverError::io(e, parent))?;
        }
        let out = File::create(&target).map_err(|e| ArchiverError::io(e, &target))?;
        let mut out = BufWriter::new(out);
        for (i, chunk) in block.chunks.iter().enumerate() {
            let data = codec.decompress(chunk).map_err(|e| {
                ArchiverError::Format(format!("'{}' chunk {}: {} decode failed: {}", block.name, i, codec.name(), e))
            })?;
            out.write_all(&data).map_err(|e| ArchiverError::io(e, &target))?;
            summary.bytes_written += data.len() as u64;
        }
        out.flush().map_err(|e| ArchiverError::io(e, &target))?;
        debug!(name = %block.name, chunks = block.chunks.len(), compressed = block.compressed_len(), "extracted");
        summary.files_extracted += 1;
    }

    info!(files = summary.files_extracted, bytes = summary.bytes_written, "extraction finished");
    Ok(summary)
}

/// Joins an archive name onto `base`, refusing anything that would escape it.
fn safe_join(base: &Path, name: &str) -> Result<PathBuf> {
    let mut out = base.to_path_buf();
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') || part.contains('\0') {
            return Err(ArchiverError::Format(format!("unsafe entry name '{}'", name)));
        }
        out.push(part);
    }
    Ok(out)
}
