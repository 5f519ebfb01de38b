//! Frame payload compression.

use std::io;
use std::sync::{Mutex, OnceLock, PoisonError};

use zstd::bulk::Compressor;

/// Compresses `input` into `output` with the shared zstd compressor.
///
/// One compressor context is kept for the lifetime of the process and
/// guarded by a mutex; flushes are serialized through it. `output` is
/// overwritten.
pub(crate) fn compress_into(input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
    static COMPRESSOR: OnceLock<Mutex<Compressor<'static>>> = OnceLock::new();

    let compressor = match COMPRESSOR.get() {
        Some(compressor) => compressor,
        None => {
            let fresh = Mutex::new(Compressor::new(zstd::DEFAULT_COMPRESSION_LEVEL)?);
            COMPRESSOR.get_or_init(|| fresh)
        }
    };

    let mut compressor = compressor.lock().unwrap_or_else(PoisonError::into_inner);

    output.clear();
    output.reserve(zstd::zstd_safe::compress_bound(input.len()));
    compressor.compress_to_buffer(input, output)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let payload = br#"[{"t":1,"s":10,"c":4}]"#;

        let mut compressed = Vec::new();
        compress_into(payload, &mut compressed).unwrap();
        assert!(!compressed.is_empty());

        let decoded = zstd::decode_all(compressed.as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_output_is_overwritten() {
        let mut compressed = b"stale".to_vec();
        compress_into(b"fresh payload", &mut compressed).unwrap();

        let decoded = zstd::decode_all(compressed.as_slice()).unwrap();
        assert_eq!(decoded, b"fresh payload");
    }
}
