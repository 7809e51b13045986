//! # Chunk Planner
//!
//! Walks the input tree and turns every regular file into an ordered list of
//! [`ChunkTask`]s. Only metadata is touched here; file contents are read later,
//! one chunk at a time, by the workers.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::common::{ChunkTask, SourceEntry};
use crate::error::{ArchiverError, Result};

/// The complete, ordered work list for one run.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub root: PathBuf,
    pub chunk_size: u64,
    /// Files in traversal order.
    pub entries: Vec<Arc<SourceEntry>>,
    /// Tasks grouped by file, ascending `chunk_index` within each file.
    pub tasks: Vec<ChunkTask>,
}

impl ChunkPlan {
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }
}

/// Splits one file into its chunk tasks.
///
/// `ceil(size / chunk_size)` tasks, each `chunk_size` long except possibly the
/// last. A zero-byte file yields a single zero-length task so its name still
/// reaches the archive.
pub fn chunk_tasks(entry: &Arc<SourceEntry>, chunk_size: u64) -> Result<Vec<ChunkTask>> {
    if chunk_size == 0 {
        return Err(ArchiverError::InvalidOption("chunk size must be positive".into()));
    }
    let count = entry.chunk_count(chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(ArchiverError::TooManyChunks { path: entry.path.clone(), chunks: count });
    }

    let tasks = (0..count as u32)
        .map(|chunk_index| {
            let byte_offset = u64::from(chunk_index) * chunk_size;
            ChunkTask {
                entry: Arc::clone(entry),
                chunk_index,
                byte_offset,
                byte_length: chunk_size.min(entry.size - byte_offset),
            }
        })
        .collect();
    Ok(tasks)
}

/// Builds the plan for every regular file under `root`, recursively.
///
/// Traversal is deterministic (entries sorted by file name at every level) and
/// does not follow symlinks.
pub fn plan_tree(root: &Path, chunk_size: u64) -> Result<ChunkPlan> {
    plan_tree_excluding(root, chunk_size, None)
}

/// Like [`plan_tree`], but leaves out `exclude` if it is an existing file under
/// `root`. Used for the output archive, which must never be packed into itself.
pub fn plan_tree_excluding(root: &Path, chunk_size: u64, exclude: Option<&Path>) -> Result<ChunkPlan> {
    if chunk_size == 0 {
        return Err(ArchiverError::InvalidOption("chunk size must be positive".into()));
    }
    match std::fs::metadata(root) {
        Ok(md) if md.is_dir() => {}
        Ok(_) => return Err(ArchiverError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArchiverError::NotFound(root.to_path_buf()))
        }
        Err(e) => return Err(ArchiverError::io(e, root)),
    }

    let skip_name = exclude.and_then(|path| name_under_root(root, path));
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for e in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let e = e.map_err(|err| walk_error(err, root))?;
        if !e.file_type().is_file() {
            // directories are implied by names; symlinks and specials are skipped
            continue;
        }
        let size = e.metadata().map_err(|err| walk_error(err, e.path()))?.len();
        let archive_name = archive_name(root, e.path())?;
        if skip_name.as_deref() == Some(&*archive_name) {
            info!("Skipping {}: it is the output archive", e.path().display());
            continue;
        }
        if !seen.insert(Arc::clone(&archive_name)) {
            return Err(ArchiverError::DuplicateName(archive_name.to_string()));
        }
        entries.push(Arc::new(SourceEntry {
            path: e.path().to_path_buf(),
            archive_name,
            size,
        }));
    }

    if entries.is_empty() {
        return Err(ArchiverError::EmptyInput(root.to_path_buf()));
    }

    let mut tasks = Vec::new();
    for entry in &entries {
        tasks.extend(chunk_tasks(entry, chunk_size)?);
    }
    debug!(files = entries.len(), tasks = tasks.len(), chunk_size, "planned chunk tasks");

    Ok(ChunkPlan {
        root: root.to_path_buf(),
        chunk_size,
        entries,
        tasks,
    })
}

/// Relative, `/`-joined UTF-8 name of `path` under `root`.
fn archive_name(root: &Path, path: &Path) -> Result<Arc<str>> {
    let invalid = |reason: &str| ArchiverError::InvalidName {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let rel = path
        .strip_prefix(root)
        .map_err(|_| invalid("not under the input root"))?;

    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(s) => parts.push(s.to_str().ok_or_else(|| invalid("name is not valid UTF-8"))?),
            _ => return Err(invalid("unexpected path component")),
        }
    }
    let name = parts.join("/");
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.len() > usize::from(u16::MAX) {
        return Err(invalid("name longer than 65535 bytes"));
    }
    Ok(Arc::from(name))
}

/// Archive name `path` would get if it lies under `root`, resolving symlinks
/// on both sides. `None` if it does not exist or lies elsewhere.
fn name_under_root(root: &Path, path: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    let parts = path
        .strip_prefix(&root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

fn walk_error(err: walkdir::Error, fallback: &Path) -> ArchiverError {
    let path = err.path().unwrap_or(fallback).to_path_buf();
    ArchiverError::io(io::Error::from(err), path)
}
