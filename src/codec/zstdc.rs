use super::Codec;
use std::io;
use std::ops::RangeInclusive;

pub struct ZstdCodec;

/// Levels accepted by the linked libzstd (negative levels are the "fast" modes).
pub fn level_range() -> RangeInclusive<i32> {
    zstd::compression_level_range()
}

/// Version of the linked libzstd, e.g. `1.5.6`.
pub fn library_version() -> String {
    let n = zstd::zstd_safe::version_number();
    format!("{}.{}.{}", n / 10_000, (n / 100) % 100, n % 100)
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extension(&self) -> &'static str {
        "zst"
    }

    fn compress(&self, src: &[u8], level: i32) -> io::Result<Vec<u8>> {
        zstd::bulk::compress(src, level)
    }

    fn decompress(&self, src: &[u8]) -> io::Result<Vec<u8>> {
        // Frames written by `bulk::compress` carry their content size, but the
        // streaming decoder also handles frames without it.
        zstd::stream::decode_all(src)
    }
}
