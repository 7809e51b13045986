use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::codec::CodecKind;
use crate::common::DEFAULT_CHUNK_SIZE;
use crate::compress::PackOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Pack a directory tree into a chunked archive.
    #[command(alias = "c")]
    Create {
        /// Directory to compress.
        source: PathBuf,

        /// Output archive. The codec's extension (e.g. `.zst`) is appended if missing.
        output: PathBuf,

        /// Compression level. For zstd: 1-22, or negative for the fast modes.
        #[arg(long, env = "CHUNKZIP_LEVEL", default_value_t = 3, allow_negative_numbers = true)]
        level: i32,

        /// Chunk size in bytes.
        #[arg(long, env = "CHUNKZIP_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE,
              value_parser = clap::value_parser!(u64).range(1..))]
        chunk_size: u64,

        /// Number of worker threads. [0 = one per CPU]
        #[arg(long, env = "CHUNKZIP_THREADS", default_value_t = 0)]
        threads: usize,

        /// Codec used for every chunk.
        #[arg(long, value_enum, default_value_t = CodecKind::Zstd)]
        codec: CodecKind,

        /// Print the final summary as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List the file blocks of an archive.
    #[command(alias = "l")]
    List {
        archive: PathBuf,

        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract every file of an archive.
    #[command(alias = "x")]
    Extract {
        archive: PathBuf,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Codec the archive was created with.
        #[arg(long, value_enum, default_value_t = CodecKind::Zstd)]
        codec: CodecKind,

        /// Also write files that are missing chunks.
        #[arg(long)]
        keep_incomplete: bool,
    },
}

impl Commands {
    /// Pack options for a `create` command, `None` for other commands.
    pub fn pack_options(&self) -> Option<PackOptions> {
        match self {
            Commands::Create { level, chunk_size, threads, codec, .. } => Some(PackOptions {
                level: *level,
                chunk_size: *chunk_size,
                workers: *threads,
                codec: *codec,
            }),
            _ => None,
        }
    }
}

/// Appends `.{ext}` unless `path` already ends with it.
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext));
    if has_ext {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, clap::Error> {
    let args = Args::try_parse()?;
    Ok(args.command)
}
