//! Decompression (spec.md §4.1). A single growable buffer is reused across
//! every batch on one connection and capped at 32 MiB; it is never shared
//! across connections (spec.md §5 "Native decompression buffers are
//! per-connection").

use std::io::Read;

use crate::error::WireError;
use crate::wire::Compression;

/// Safety bound, not a wire-level limit (spec.md §9 open question): a
/// producer whose inflated batch exceeds this causes a connection-level
/// failure, not a query-level one.
pub const MAX_DECOMPRESSED_BYTES: usize = 32 * 1024 * 1024;

/// Per-connection reusable decompression buffer.
pub struct DecompressBuffer {
    buf: Vec<u8>,
}

impl DecompressBuffer {
    pub fn new() -> Self {
        DecompressBuffer { buf: Vec::new() }
    }

    /// Decompresses `input` per `algorithm`, growing the internal buffer on
    /// demand up to `MAX_DECOMPRESSED_BYTES`, and returns the decompressed
    /// bytes as a slice borrowed from the internal buffer.
    pub fn decompress(&mut self, input: &[u8], algorithm: Compression) -> Result<&[u8], WireError> {
        self.buf.clear();
        match algorithm {
            Compression::None => {
                if input.len() > MAX_DECOMPRESSED_BYTES {
                    return Err(WireError::DecompressionBufferOverflow);
                }
                self.buf.extend_from_slice(input);
            }
            Compression::Zlib => {
                let mut decoder = flate2::read::ZlibDecoder::new(input);
                read_capped(&mut decoder, &mut self.buf)?;
            }
            Compression::Lz4 => {
                let decoded = lz4_flex::block::decompress_size_prepended(input).map_err(|e| {
                    WireError::MalformedFrame(format!("lz4 decode failed: {e}"))
                })?;
                if decoded.len() > MAX_DECOMPRESSED_BYTES {
                    return Err(WireError::DecompressionBufferOverflow);
                }
                self.buf = decoded;
            }
        }
        Ok(&self.buf)
    }
}

impl Default for DecompressBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads from `r` into `out`, failing once `out` would exceed the cap
/// rather than growing without bound.
fn read_capped<R: Read>(r: &mut R, out: &mut Vec<u8>) -> Result<(), WireError> {
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if out.len() + n > MAX_DECOMPRESSED_BYTES {
            return Err(WireError::DecompressionBufferOverflow);
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}
