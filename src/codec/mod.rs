//! # Codec Adapter
//!
//! Thin interface around the entropy coder. Chunks are compressed one at a time
//! from memory, so the contract is plain `bytes -> bytes` in both directions.

use std::io;

use clap::ValueEnum;

pub mod store;
pub mod zstdc;

pub use store::Store;
pub use zstdc::ZstdCodec;

/// A chunk codec. Implementations must be shareable across worker threads.
pub trait Codec: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Canonical file extension (without the dot) for archives produced with this codec.
    fn extension(&self) -> &'static str;

    fn compress(&self, src: &[u8], level: i32) -> io::Result<Vec<u8>>;

    fn decompress(&self, src: &[u8]) -> io::Result<Vec<u8>>;
}

/// Selectable codecs.
#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CodecKind {
    /// Zstandard. The default.
    #[default]
    Zstd,
    /// No compression; chunks are stored verbatim.
    Store,
}

impl CodecKind {
    pub fn build(self) -> Box<dyn Codec> {
        match self {
            CodecKind::Zstd => Box::new(ZstdCodec),
            CodecKind::Store => Box::new(Store),
        }
    }

    pub fn extension(self) -> &'static str {
        self.build().extension()
    }
}
