use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::PersistError;

/// Deflate-compress a serialized record.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a record written by [`compress`].
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PersistError::DecompressError(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_shrinks_uniform_data() {
        let data = vec![7u8; 4096];
        let packed = compress(&data).expect("deflate");
        assert!(packed.len() < 100, "uniform data should deflate well");
        assert_eq!(decompress(&packed).expect("inflate"), data);
    }

    #[test]
    fn test_garbage_rejected() {
        let result = decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        assert!(matches!(result, Err(PersistError::DecompressError(_))));
    }
}
