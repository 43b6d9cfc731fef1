use crate::error::Error;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

// Helper function to gzip-compress a payload, used by tests and
// available to servers the HTTP client talks to
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let compressed_payload = encoder.finish()?;
    Ok(compressed_payload)
}

// Decompresses a gzip-framed byte stream, as found in HTTP bodies
// served with Content-Encoding: gzip
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = GzDecoder::new(payload);
    let mut decompressed_data = Vec::new();
    decoder
        .read_to_end(&mut decompressed_data)
        .map_err(|_| Error::GzipDecode)?;

    Ok(decompressed_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let body = b"a body worth compressing, a body worth compressing".repeat(20);
        let compressed = compress(&body).unwrap();
        assert!(compressed.len() < body.len());
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, body);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let compressed = compress(b"some data").unwrap();
        let truncated = &compressed[..compressed.len() - 3];
        assert!(decompress(truncated).is_err());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
