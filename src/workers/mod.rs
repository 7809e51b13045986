//! # Task Scheduler
//!
//! Fans chunk tasks out to a bounded pool of worker threads and hands results
//! back to the calling thread in completion order.
//!
//! Layout of one run:
//! - a producer thread pushes every task into a bounded task channel;
//! - `W` workers pull tasks, read their byte range, run the codec and push a
//!   [`ChunkResult`] into a bounded result channel;
//! - the calling thread drains the result channel through `on_result`.
//!
//! The pool lives inside [`std::thread::scope`], so every thread is joined
//! before [`run_chunk_tasks`] returns, on success and on error alike.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, trace};

use crate::codec::Codec;
use crate::common::{ChunkOutcome, ChunkResult, ChunkTask};
use crate::error::ChunkError;

/// Worker count used when none is requested.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Shared cancellation flag. Once set, workers stop picking up new tasks.
#[derive(Default)]
struct AbortSignal(AtomicBool);

impl AbortSignal {
    fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs every task on at most `workers` threads and feeds each result to `on_result`.
///
/// Exactly one result is delivered per task unless `on_result` fails, in
/// which case the run is cancelled: queued tasks are abandoned, in-flight
/// ones are allowed to finish, and the consumer's error is returned once all
/// threads have exited.
pub fn run_chunk_tasks<F, E>(
    tasks: Vec<ChunkTask>,
    codec: &dyn Codec,
    level: i32,
    workers: usize,
    mut on_result: F,
) -> Result<(), E>
where
    F: FnMut(ChunkResult) -> Result<(), E>,
{
    if tasks.is_empty() {
        return Ok(());
    }
    let num_workers = workers.max(1).min(tasks.len());
    debug!(workers = num_workers, tasks = tasks.len(), codec = codec.name(), "starting worker pool");

    let (task_sender, task_receiver) = bounded::<ChunkTask>(num_workers * 2);
    let (result_sender, result_receiver) = bounded::<ChunkResult>(num_workers * 2);
    let abort = AbortSignal::default();

    thread::scope(|s| {
        // --- Worker Threads ---
        for id in 0..num_workers {
            let task_receiver = task_receiver.clone();
            let result_sender = result_sender.clone();
            let abort = &abort;
            s.spawn(move || {
                for task in task_receiver {
                    if abort.is_set() {
                        break;
                    }
                    let result = execute(&task, codec, level);
                    trace!(worker = id, name = %result.archive_name, chunk = result.chunk_index, "chunk done");
                    if result_sender.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_sender);
        drop(task_receiver);

        // --- Producer Thread (submits all tasks up front) ---
        let abort_ref = &abort;
        s.spawn(move || {
            for task in tasks {
                if abort_ref.is_set() || task_sender.send(task).is_err() {
                    break;
                }
            }
        });

        // --- Coordinator (calling thread) ---
        let mut outcome = Ok(());
        for result in result_receiver.iter() {
            if let Err(e) = on_result(result) {
                abort.request();
                outcome = Err(e);
                break;
            }
        }
        // Disconnect so workers blocked on `send` give up; the scope joins them.
        drop(result_receiver);
        outcome
    })
}

/// Reads the task's byte range and compresses it. Never panics on I/O errors;
/// every failure becomes a `Failed` outcome for this task only.
pub fn execute(task: &ChunkTask, codec: &dyn Codec, level: i32) -> ChunkResult {
    let outcome = match read_range(task) {
        Ok(data) => match codec.compress(&data, level) {
            Ok(payload) => ChunkOutcome::Compressed {
                payload,
                original_length: data.len() as u64,
            },
            Err(e) => ChunkOutcome::Failed(ChunkError::Codec(e)),
        },
        Err(e) => ChunkOutcome::Failed(ChunkError::Read(e)),
    };
    ChunkResult {
        archive_name: task.archive_name().clone(),
        chunk_index: task.chunk_index,
        outcome,
    }
}

fn read_range(task: &ChunkTask) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; task.byte_length as usize];
    if buf.is_empty() {
        // still require the file to exist, so a vanished empty file is reported
        File::open(&task.entry.path)?;
        return Ok(buf);
    }
    let mut file = File::open(&task.entry.path)?;
    file.seek(SeekFrom::Start(task.byte_offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Store;
    use crate::common::SourceEntry;
    use crate::plan::chunk_tasks;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn source(content: &[u8]) -> (NamedTempFile, Arc<SourceEntry>) {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        let entry = Arc::new(SourceEntry {
            path: f.path().to_path_buf(),
            archive_name: Arc::from("data.bin"),
            size: content.len() as u64,
        });
        (f, entry)
    }

    /// Store codec that sleeps longer for early chunks and tracks concurrency.
    struct SlowStore {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Codec for SlowStore {
        fn name(&self) -> &'static str {
            "slow-store"
        }
        fn extension(&self) -> &'static str {
            "bin"
        }
        fn compress(&self, src: &[u8], _level: i32) -> std::io::Result<Vec<u8>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = 20u64.saturating_sub(src.first().copied().unwrap_or(0) as u64);
            thread::sleep(Duration::from_millis(delay));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(src.to_vec())
        }
        fn decompress(&self, src: &[u8]) -> std::io::Result<Vec<u8>> {
            Ok(src.to_vec())
        }
    }

    #[test]
    fn every_task_yields_exactly_one_result() {
        let content: Vec<u8> = (0..64u8).collect();
        let (_f, entry) = source(&content);
        let tasks = chunk_tasks(&entry, 4).unwrap();
        let codec = SlowStore { active: AtomicUsize::new(0), peak: AtomicUsize::new(0) };

        let mut seen = HashSet::new();
        run_chunk_tasks::<_, ()>(tasks, &codec, 0, 3, |r| {
            let ChunkOutcome::Compressed { payload, original_length } = r.outcome else {
                panic!("chunk {} failed", r.chunk_index);
            };
            assert_eq!(original_length, 4);
            assert_eq!(payload[0] as u32, r.chunk_index * 4);
            assert!(seen.insert(r.chunk_index), "chunk {} delivered twice", r.chunk_index);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 16);
        assert!(codec.peak.load(Ordering::SeqCst) <= 3, "more than W tasks ran at once");
    }

    #[test]
    fn read_failure_is_isolated_to_its_chunk() {
        let (f, entry) = source(&[1u8; 30]);
        let tasks = chunk_tasks(&entry, 10).unwrap();
        // shrink the file after planning: the last chunk can no longer be read
        f.as_file().set_len(25).unwrap();

        let mut failed = Vec::new();
        let mut ok = 0;
        run_chunk_tasks::<_, ()>(tasks, &Store, 0, 2, |r| {
            match r.outcome {
                ChunkOutcome::Failed(ChunkError::Read(_)) => failed.push(r.chunk_index),
                ChunkOutcome::Failed(e) => panic!("unexpected failure {e}"),
                ChunkOutcome::Compressed { .. } => ok += 1,
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(failed, vec![2]);
        assert_eq!(ok, 2);
    }

    #[test]
    fn consumer_error_cancels_the_run() {
        let content = vec![9u8; 1000];
        let (_f, entry) = source(&content);
        let tasks = chunk_tasks(&entry, 1).unwrap();
        let mut delivered = 0;
        let res = run_chunk_tasks(tasks, &Store, 0, 4, |_| {
            delivered += 1;
            if delivered == 5 {
                Err("disk full")
            } else {
                Ok(())
            }
        });
        assert_eq!(res, Err("disk full"));
        assert_eq!(delivered, 5);
    }
}
