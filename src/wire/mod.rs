//! Wire codec (C1): frame/unframe, handshake, decompression, and batch
//! decode. All lengths are 4-byte big-endian unsigned integers (spec.md
//! §6); strings are UTF-8 and not null-terminated.

pub mod compress;
pub mod decode;
pub mod frame;
pub mod handshake;

/// Reserved control-connection magic: 4 bytes that can never collide with a
/// legal `qid_len` (1..=1024), per spec.md §4.3 and §9 ("keep the
/// `0xFEEDFACE` sentinel").
pub const CONTROL_MAGIC: u32 = 0xFEED_FACE;

/// Compression algorithm tags carried on the wire (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Lz4,
}

impl Compression {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Zlib),
            2 => Some(Compression::Lz4),
            _ => None,
        }
    }
}

/// The only control command currently defined (spec.md §4.3).
pub const CMD_JOB_FINISHED: u32 = 1;

/// Upper bound on token / query-id lengths accepted on the wire.
pub const MAX_ID_LEN: u32 = 1024;
