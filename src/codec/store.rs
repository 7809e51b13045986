use super::Codec;
use std::io;

pub struct Store;

impl Codec for Store {
    fn name(&self) -> &'static str {
        "store"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    fn compress(&self, src: &[u8], _level: i32) -> io::Result<Vec<u8>> {
        Ok(src.to_vec())
    }

    fn decompress(&self, src: &[u8]) -> io::Result<Vec<u8>> {
        Ok(src.to_vec())
    }
}
