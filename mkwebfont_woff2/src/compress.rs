use crate::error::{Result, Woff2Error};
use brotli::enc::{backward_references::BrotliEncoderMode, BrotliEncoderParams};
use std::io::{self, Cursor, Write};

pub const MAX_BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW_BITS: i32 = 22;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionMode {
    Font,
    Text,
}

pub fn brotli_compress(data: &[u8], quality: u32, mode: CompressionMode) -> Result<Vec<u8>> {
    if quality > MAX_BROTLI_QUALITY {
        return Err(Woff2Error::InvalidQuality(quality));
    }
    let params = BrotliEncoderParams {
        quality: quality as i32,
        lgwin: BROTLI_WINDOW_BITS,
        mode: match mode {
            CompressionMode::Font => BrotliEncoderMode::BROTLI_MODE_FONT,
            CompressionMode::Text => BrotliEncoderMode::BROTLI_MODE_TEXT,
        },
        size_hint: data.len(),
        ..Default::default()
    };

    let mut out = Vec::with_capacity(brotli_bound(data.len()));
    brotli::BrotliCompress(&mut Cursor::new(data), &mut out, &params)?;
    Ok(out)
}

/// Decompresses a brotli stream that must expand to exactly `expected_len` bytes.
pub fn brotli_decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut output = BoundedOutput(Vec::with_capacity(expected_len), expected_len);
    brotli::BrotliDecompress(&mut Cursor::new(data), &mut output)?;

    if output.0.len() != expected_len {
        return Err(Woff2Error::Malformed("decompressed data has the wrong size"));
    }
    Ok(output.0)
}

/// The largest size brotli may produce for an input of the given length.
///
/// The constant terms are the stream header and the uncompressed meta-block headers emitted
/// for incompressible data at qualities 2 and above. The one-pass encoders used at qualities 0
/// and 1 never fall back to uncompressed meta-blocks, and on random input their entropy code
/// and block headers cost up to about 0.08% of the input. `len >> 9` (about 0.2%) covers that
/// with room to spare.
pub const fn brotli_bound(len: usize) -> usize {
    if len == 0 {
        return 2;
    }
    let num_large_blocks = len >> 14;
    len + 2 + 4 * num_large_blocks + 3 + 1 + (len >> 9)
}

struct BoundedOutput(Vec<u8>, usize);
impl Write for BoundedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.1 < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "decompressed data is larger than expected",
            ));
        }
        self.1 -= buf.len();
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data: Vec<u8> = (0..10000u32).map(|x| (x % 251) as u8).collect();
        for quality in [0, 5, 11] {
            let compressed = brotli_compress(&data, quality, CompressionMode::Font).unwrap();
            assert!(compressed.len() < data.len());
            assert_eq!(brotli_decompress(&compressed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn empty_input() {
        let compressed = brotli_compress(&[], 11, CompressionMode::Text).unwrap();
        assert!(compressed.len() <= brotli_bound(0));
        assert!(brotli_decompress(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_quality() {
        assert!(matches!(
            brotli_compress(b"abc", 12, CompressionMode::Font),
            Err(Woff2Error::InvalidQuality(12))
        ));
    }

    #[test]
    fn checks_decompressed_size() {
        let compressed = brotli_compress(b"hello, world", 11, CompressionMode::Text).unwrap();
        assert!(brotli_decompress(&compressed, 11).is_err());
        assert!(brotli_decompress(&compressed, 13).is_err());
        assert!(brotli_decompress(&compressed[..compressed.len() - 1], 12).is_err());
    }

    #[test]
    fn incompressible_data_stays_within_bound() {
        let mut state = 0x12345678u32;
        let data: Vec<u8> = (0..100000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        for quality in [0, 1, 5, 11] {
            let compressed = brotli_compress(&data, quality, CompressionMode::Font).unwrap();
            assert!(compressed.len() <= brotli_bound(data.len()), "quality {quality}");
        }
    }
}
