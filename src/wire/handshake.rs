//! Handshake parsing: token, opcode discrimination, and the DATA-path
//! schema preamble (spec.md §4.1, §4.3, §6).

use std::io::Read;

use serde::Deserialize;

use crate::error::WireError;
use crate::page::{ColumnDescriptor, WireTag};
use crate::wire::frame::read_u32;
use crate::wire::{Compression, CONTROL_MAGIC, MAX_ID_LEN};

/// Reads `[4]len [len]bytes`, enforcing the 1024-byte cap shared by tokens
/// and query-ids (spec.md §4.1 `TokenTooLarge`).
fn read_capped_string<R: Read>(r: &mut R, allow_zero: bool) -> Result<String, WireError> {
    let len = read_u32(r)?;
    if len == 0 && !allow_zero {
        return Err(WireError::MalformedFrame("zero-length identifier".into()));
    }
    if len > MAX_ID_LEN {
        return Err(WireError::TokenTooLarge);
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| WireError::MalformedFrame(e.to_string()))
}

/// Reads the token that prefixes every inbound connection.
pub fn read_token<R: Read>(r: &mut R) -> Result<String, WireError> {
    read_capped_string(r, false)
}

/// Discriminates DATA from CONTROL per spec.md §4.3: the 4 bytes following
/// the token are either a `qid_len` in `1..=1024` or the reserved magic.
/// Reserved-range overlap is impossible because `0xFEEDFACE` is far outside
/// `1..=1024`.
pub enum ConnectionKind {
    Data { qid: String },
    Control { qid: String },
}

pub fn read_opcode<R: Read>(r: &mut R) -> Result<ConnectionKind, WireError> {
    let prefix = read_u32(r)?;
    if prefix == CONTROL_MAGIC {
        let qid = read_capped_string(r, false)?;
        Ok(ConnectionKind::Control { qid })
    } else if (1..=MAX_ID_LEN).contains(&prefix) {
        let mut buf = vec![0u8; prefix as usize];
        r.read_exact(&mut buf)?;
        let qid = String::from_utf8(buf).map_err(|e| WireError::MalformedFrame(e.to_string()))?;
        Ok(ConnectionKind::Data { qid })
    } else {
        Err(WireError::MalformedFrame(format!(
            "opcode prefix {prefix} is neither a valid qid length nor the control magic"
        )))
    }
}

/// Reads the control command code (only `1 = JOB_FINISHED` is acted on;
/// other codes are reserved and still require full token validation by the
/// caller before `ACT`, per spec.md §4.3).
pub fn read_command<R: Read>(r: &mut R) -> Result<u32, WireError> {
    read_u32(r)
}

/// The DATA-path preamble that follows `qid`: compression tag and schema
/// JSON (spec.md §6).
pub struct DataPreamble {
    pub compression: Compression,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Deserialize)]
struct SchemaJson {
    columns: Vec<SchemaColumn>,
}

#[derive(Deserialize)]
struct SchemaColumn {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

pub fn read_data_preamble<R: Read>(r: &mut R, max_schema_len: u32) -> Result<DataPreamble, WireError> {
    let compression_tag = read_u32(r)? as i32;
    let compression = Compression::from_tag(compression_tag)
        .ok_or(WireError::UnsupportedCompression(compression_tag))?;

    let schema_len = read_u32(r)?;
    if schema_len > max_schema_len {
        return Err(WireError::MalformedFrame(format!(
            "schema JSON length {schema_len} exceeds cap {max_schema_len}"
        )));
    }
    let mut schema_buf = vec![0u8; schema_len as usize];
    r.read_exact(&mut schema_buf)?;

    let schema: SchemaJson = serde_json::from_slice(&schema_buf)?;
    let mut columns = Vec::with_capacity(schema.columns.len());
    for col in schema.columns {
        let wire_tag = WireTag::from_str(&col.ty).ok_or_else(|| WireError::UnknownTag(col.ty.clone()))?;
        columns.push(ColumnDescriptor {
            name: col.name,
            wire_tag,
        });
    }

    Ok(DataPreamble {
        compression,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_frame(s: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
        buf
    }

    #[test]
    fn reads_a_plain_token() {
        let buf = token_frame("cafebabe");
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_token(&mut cursor).unwrap(), "cafebabe");
    }

    #[test]
    fn rejects_oversized_token() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2000u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_token(&mut cursor),
            Err(WireError::TokenTooLarge)
        ));
    }

    #[test]
    fn discriminates_control_magic_from_qid_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&CONTROL_MAGIC.to_be_bytes());
        buf.extend_from_slice(&token_frame("q1"));
        let mut cursor = std::io::Cursor::new(buf);
        match read_opcode(&mut cursor).unwrap() {
            ConnectionKind::Control { qid } => assert_eq!(qid, "q1"),
            ConnectionKind::Data { .. } => panic!("expected control"),
        }
    }

    #[test]
    fn discriminates_data_qid_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(b"q1");
        let mut cursor = std::io::Cursor::new(buf);
        match read_opcode(&mut cursor).unwrap() {
            ConnectionKind::Data { qid } => assert_eq!(qid, "q1"),
            ConnectionKind::Control { .. } => panic!("expected data"),
        }
    }

    #[test]
    fn parses_schema_json() {
        let schema = br#"{"columns":[{"name":"a","type":"INTEGER"}]}"#;
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes()); // NONE
        buf.extend_from_slice(&(schema.len() as u32).to_be_bytes());
        buf.extend_from_slice(schema);
        let mut cursor = std::io::Cursor::new(buf);
        let preamble = read_data_preamble(&mut cursor, 1 << 20).unwrap();
        assert_eq!(preamble.compression, Compression::None);
        assert_eq!(preamble.columns.len(), 1);
        assert_eq!(preamble.columns[0].name, "a");
        assert_eq!(preamble.columns[0].wire_tag, WireTag::Integer);
    }
}
