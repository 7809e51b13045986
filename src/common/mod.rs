//! Common utilities and types module.
// Shared structs passed between the planner, the workers and the assembler.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ChunkError;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// One regular file found under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated. Unique within an archive.
    pub archive_name: Arc<str>,
    pub size: u64,
}

impl SourceEntry {
    /// Number of chunks this file is split into. Empty files still get one.
    pub fn chunk_count(&self, chunk_size: u64) -> u64 {
        if self.size == 0 {
            1
        } else {
            self.size.div_ceil(chunk_size)
        }
    }
}

/// A contiguous byte range of one file, the unit of parallel work.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub entry: Arc<SourceEntry>,
    pub chunk_index: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
}

impl ChunkTask {
    pub fn archive_name(&self) -> &Arc<str> {
        &self.entry.archive_name
    }
}

#[derive(Debug)]
pub enum ChunkOutcome {
    Compressed { payload: Vec<u8>, original_length: u64 },
    Failed(ChunkError),
}

/// What a worker hands back for each task.
#[derive(Debug)]
pub struct ChunkResult {
    pub archive_name: Arc<str>,
    pub chunk_index: u32,
    pub outcome: ChunkOutcome,
}
