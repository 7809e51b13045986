//! # Compression Pipeline
//!
//! Orchestrates one archive run: plan the chunk tasks, fan them out to the
//! worker pool, and feed every result to the stats aggregator and the
//! assembler on the calling thread.
//!
//! The output file is created only after planning succeeded, so a missing or
//! empty input leaves nothing behind. If writing fails part-way the partial
//! archive is removed before the error is returned.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::archive::{Assembler, AssemblyReport};
use crate::codec::{zstdc, Codec, CodecKind};
use crate::common::DEFAULT_CHUNK_SIZE;
use crate::error::{ArchiverError, Result};
use crate::plan::{plan_tree_excluding, ChunkPlan};
use crate::stats::{PackStats, StatsAggregator};
use crate::workers::{default_workers, run_chunk_tasks};

/// Largest accepted chunk size. Keeps every compressed payload well inside the
/// `u32` record length.
pub const MAX_CHUNK_SIZE: u64 = 1 << 30;

/// Upper bound on explicitly requested worker threads.
pub const MAX_WORKERS: usize = 4096;

/// Holds all configuration options for a compression run.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Codec level (for zstd, `zstd::compression_level_range()`).
    pub level: i32,
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// Worker threads. `0` means one per available CPU.
    pub workers: usize,
    pub codec: CodecKind,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            level: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            codec: CodecKind::Zstd,
        }
    }
}

impl PackOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ArchiverError::InvalidOption(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.workers > MAX_WORKERS {
            return Err(ArchiverError::InvalidOption(format!(
                "thread count must be at most {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.codec == CodecKind::Zstd {
            let range = zstdc::level_range();
            if !range.contains(&self.level) {
                return Err(ArchiverError::InvalidOption(format!(
                    "zstd level must be in {}..={}, got {}",
                    range.start(),
                    range.end(),
                    self.level
                )));
            }
        }
        Ok(())
    }

    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        }
    }
}

/// Everything reported at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct PackSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub files: usize,
    pub files_written: u64,
    pub archive_bytes: u64,
    pub stats: PackStats,
    pub incomplete_files: Vec<String>,
    pub omitted_files: Vec<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl PackSummary {
    /// True when at least one chunk failed; the archive is then only partially usable.
    pub fn completed_with_errors(&self) -> bool {
        self.stats.has_failures()
    }

    fn new(plan: &ChunkPlan, output: &Path, stats: PackStats, report: AssemblyReport, elapsed: Duration) -> Self {
        Self {
            input: plan.root.clone(),
            output: output.to_path_buf(),
            files: plan.file_count(),
            files_written: report.files_written,
            archive_bytes: report.bytes_written,
            stats,
            incomplete_files: report.incomplete_files,
            omitted_files: report.omitted_files,
            elapsed,
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Packs the directory `input` into the archive file `output`.
pub fn pack_directory(input: &Path, output: &Path, options: &PackOptions) -> Result<PackSummary> {
    options.validate()?;
    let plan = plan_tree_excluding(input, options.chunk_size, Some(output))?;
    info!(
        "Compressing {} files ({} bytes, {} chunks) from {} → {}",
        plan.file_count(),
        plan.total_bytes(),
        plan.tasks.len(),
        input.display(),
        output.display()
    );
    let codec = options.codec.build();
    pack_plan(plan, output, codec.as_ref(), options)
}

/// Runs an already computed plan into the file at `output`.
///
/// On any fatal error the partially written file is deleted.
pub fn pack_plan(plan: ChunkPlan, output: &Path, codec: &dyn Codec, options: &PackOptions) -> Result<PackSummary> {
    let started = Instant::now();
    let file = File::create(output).map_err(|e| ArchiverError::io(e, output))?;

    let result = pack_to_writer(&plan, file, codec, options).and_then(|(stats, report, file)| {
        file.sync_all().map_err(|e| ArchiverError::io(e, output))?;
        Ok((stats, report))
    });

    match result {
        Ok((stats, report)) => Ok(PackSummary::new(&plan, output, stats, report, started.elapsed())),
        Err(e) => {
            error!("archive {} is invalid and has been discarded: {}", output.display(), e);
            if let Err(rm) = fs::remove_file(output) {
                error!("could not remove partial archive {}: {}", output.display(), rm);
            }
            Err(match e {
                ArchiverError::Io { source, path } if path.as_os_str().is_empty() => ArchiverError::io(source, output),
                other => other,
            })
        }
    }
}

/// Core loop: schedule every task and route results through stats and assembly.
///
/// The writer is only ever touched from the calling thread.
pub fn pack_to_writer<W: Write>(
    plan: &ChunkPlan,
    writer: W,
    codec: &dyn Codec,
    options: &PackOptions,
) -> Result<(PackStats, AssemblyReport, W)> {
    let mut assembler = Assembler::new(writer, plan)?;
    let mut stats = StatsAggregator::new();

    run_chunk_tasks(plan.tasks.clone(), codec, options.level, options.effective_workers(), |result| {
        stats.record(&result);
        assembler.accept(result).map(|_| ())
    })?;

    let (report, writer) = assembler.finish()?;
    Ok((stats.finish(), report, writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ArchiveReader;
    use crate::plan::plan_tree;

    #[test]
    fn default_options_are_valid() {
        let opts = PackOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.chunk_size, 1024 * 1024);
        assert!(opts.effective_workers() >= 1);
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        let zero = PackOptions { chunk_size: 0, ..Default::default() };
        assert!(matches!(zero.validate(), Err(ArchiverError::InvalidOption(_))));
        let huge = PackOptions { chunk_size: MAX_CHUNK_SIZE + 1, ..Default::default() };
        assert!(huge.validate().is_err());
        let level = PackOptions { level: 1000, ..Default::default() };
        assert!(level.validate().is_err());
        let store = PackOptions { level: 1000, codec: CodecKind::Store, ..Default::default() };
        assert!(store.validate().is_ok());
        let threads = PackOptions { workers: MAX_WORKERS + 1, ..Default::default() };
        assert!(matches!(threads.validate(), Err(ArchiverError::InvalidOption(_))));
    }

    #[test]
    fn output_is_not_created_when_planning_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.zst");
        let err = pack_directory(&dir.path().join("missing"), &out, &PackOptions::default()).unwrap_err();
        assert!(matches!(err, ArchiverError::NotFound(_)));
        assert!(!out.exists());
    }

    /// A writer that fails after a byte budget, standing in for a full disk.
    struct FullDisk(usize);

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.0 == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"));
            }
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_fatal() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a"), vec![1u8; 4096])?;
        let opts = PackOptions { chunk_size: 512, codec: CodecKind::Store, workers: 2, ..Default::default() };
        let plan = plan_tree(dir.path(), opts.chunk_size)?;
        let res = pack_to_writer(&plan, FullDisk(100), &crate::codec::Store, &opts);
        assert!(matches!(res, Err(ArchiverError::Io { .. })));
        Ok(())
    }

    #[test]
    fn in_memory_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(dir.path().join("data.bin"), &data)?;
        let opts = PackOptions { chunk_size: 1000, workers: 4, ..Default::default() };
        let plan = plan_tree(dir.path(), opts.chunk_size)?;
        let codec = opts.codec.build();

        let (stats, report, bytes) = pack_to_writer(&plan, Vec::new(), codec.as_ref(), &opts)?;
        assert_eq!(stats.chunks, 10);
        assert_eq!(stats.original_bytes, 10_000);
        assert_eq!(report.files_written, 1);

        let blocks = ArchiveReader::new(&bytes[..]).collect::<Result<Vec<_>>>()?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].decode(codec.as_ref())?, data);
        Ok(())
    }
}
