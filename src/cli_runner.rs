//! Reusable CLI runner: executes a parsed [`Commands`] and prints the
//! user-facing report. `main` only adds logging setup and exit codes.

use std::process::ExitCode;

use crate::cli::{self, Commands};
use crate::codec::zstdc;
use crate::compress::{pack_directory, PackSummary};
use crate::error::ArchiverError;
use crate::extract::{extract_archive, list_archive, ExtractSummary};

/// Exit status for a run that finished but lost one or more chunks.
/// (`2` is left to clap for usage errors.)
pub const EXIT_COMPLETED_WITH_ERRORS: u8 = 3;

/// How a non-fatal run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    CompletedWithErrors,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::CompletedWithErrors => EXIT_COMPLETED_WITH_ERRORS,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// A pack run with any failed chunk completed with errors.
    pub fn for_pack(summary: &PackSummary) -> Self {
        if summary.completed_with_errors() {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Success
        }
    }

    /// Meeting an incomplete block counts as an error, whether it was skipped or written.
    pub fn for_extract(summary: &ExtractSummary) -> Self {
        if summary.incomplete_files.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::CompletedWithErrors
        }
    }
}

/// One line naming the binary, the toolchain that built it and the linked libzstd.
pub fn version_banner() -> String {
    format!(
        "chunkzip {} ({}, zstd {})",
        env!("CARGO_PKG_VERSION"),
        env!("CHUNKZIP_RUSTC_VERSION"),
        zstdc::library_version()
    )
}

/// Public entry for running CLI logic.
pub fn run_command(command: &Commands) -> Result<RunStatus, ArchiverError> {
    match command {
        Commands::Create { source, output, codec, json, .. } => {
            let options = command
                .pack_options()
                .ok_or_else(|| ArchiverError::InvalidOption("not a create command".into()))?;
            let output = cli::with_extension(output, codec.extension());
            let summary = pack_directory(source, &output, &options)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_pack_summary(&summary);
            }
            Ok(RunStatus::for_pack(&summary))
        }
        Commands::List { archive, json } => {
            let entries = list_archive(archive)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in &entries {
                    let flag = if e.incomplete { "  INCOMPLETE" } else { "" };
                    println!("{}\t{} chunks\t{} bytes{}", e.name, e.chunks, e.compressed_bytes, flag);
                }
                println!("{} files", entries.len());
            }
            Ok(RunStatus::Success)
        }
        Commands::Extract { archive, output, codec, keep_incomplete } => {
            let codec = codec.build();
            let summary = extract_archive(archive, output, codec.as_ref(), *keep_incomplete)?;
            println!(
                "Extracted {} files ({} bytes) to {}",
                summary.files_extracted,
                summary.bytes_written,
                output.display()
            );
            for name in &summary.skipped_files {
                println!("Skipped incomplete file: {}", name);
            }
            Ok(RunStatus::for_extract(&summary))
        }
    }
}

fn print_pack_summary(summary: &PackSummary) {
    let stats = &summary.stats;
    println!("Compressed {} to {}", summary.input.display(), summary.output.display());
    println!("Original size: {} bytes", stats.original_bytes);
    println!("Compressed size: {} bytes", stats.compressed_bytes);
    match stats.ratio() {
        Some(r) => println!("Compression ratio: {:.2}", r),
        None => println!("Compression ratio: n/a"),
    }
    println!(
        "Archive: {} files, {} bytes on disk, {:.2}s",
        summary.files_written,
        summary.archive_bytes,
        summary.elapsed.as_secs_f64()
    );

    if stats.has_failures() {
        println!();
        println!("Completed with {} failed chunk(s); affected files are incomplete:", stats.failures.len());
        for f in &stats.failures {
            println!("  {} (chunk {}): {}", f.archive_name, f.chunk_index, f.reason);
        }
        for name in &summary.omitted_files {
            println!("  {} was omitted entirely", name);
        }
    }
}
