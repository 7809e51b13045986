//! # chunkzip Core Library
//!
//! Packs a directory tree into a single archive by splitting every file into
//! fixed-size chunks and compressing the chunks independently, in parallel.
//!
//! ## Key Modules
//!
//! - [`plan`]: walks the input tree and computes the chunk tasks.
//! - [`workers`]: bounded worker pool that reads and compresses chunks.
//! - [`archive`]: container format and the reassembly buffer that writes it.
//! - [`stats`]: order-independent totals and failure list.
//! - [`compress`]: the end-to-end pipeline.
//! - [`extract`]: sequential reader, list and extract.
//!
//! ## Examples
//!
//! ```no_run
//! use chunkzip::{pack_directory, PackOptions};
//! use std::path::Path;
//!
//! let summary = pack_directory(Path::new("data"), Path::new("data.zst"), &PackOptions::default())?;
//! println!("ratio: {:?}", summary.stats.ratio());
//! # Ok::<(), chunkzip::ArchiverError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod compress;
pub mod error;
pub mod extract;
pub mod plan;
pub mod stats;
pub mod workers;

pub use compress::{pack_directory, PackOptions, PackSummary};
pub use error::{ArchiverError, ChunkError};
pub use extract::{extract_archive, list_archive, ArchiveReader};
