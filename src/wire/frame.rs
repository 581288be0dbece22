//! Length-prefixed framing shared by data and control connections.

use std::io::Read;

use crate::error::WireError;

/// Reads a 4-byte big-endian length followed by that many bytes. A length
/// of `0` is legal and returned as an empty `Vec` — callers interpret it
/// per their own protocol position (e.g. batch terminator in
/// `decode::decode_batches`).
///
/// `max_len` is the configurable cap beyond which a length is treated as
/// absurd and rejected with `MalformedFrame`, per spec.md §4.1.
pub fn read_frame<R: Read>(r: &mut R, max_len: u32) -> Result<Vec<u8>, WireError> {
    let len = read_u32(r)?;
    if len > max_len {
        return Err(WireError::MalformedFrame(format!(
            "frame length {len} exceeds cap {max_len}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a raw 4-byte big-endian length without consuming a payload — used
/// to discriminate DATA vs CONTROL after the token (spec.md §4.3).
pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, WireError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Writes a 4-byte big-endian length followed by `payload`.
pub fn write_frame<W: std::io::Write>(w: &mut W, payload: &[u8]) -> std::io::Result<()> {
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)
}
