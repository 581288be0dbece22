//! Per-connection state machine (spec.md §4.3):
//! `ACCEPTED → READ_TOKEN → READ_OPCODE → (DATA | CONTROL)`.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{BridgeError, WireError};
use crate::registry::Registry;
use crate::wire::compress::DecompressBuffer;
use crate::wire::frame::read_frame;
use crate::wire::handshake::{read_command, read_data_preamble, read_opcode, read_token, ConnectionKind};
use crate::wire::{decode, CMD_JOB_FINISHED};

/// Caps and socket tuning applied while handling one connection;
/// independent of the per-page batch cap enforced by the registry's queue.
pub struct ConnectionLimits {
    pub max_frame_len: u32,
    pub max_schema_len: u32,
    pub schema_wait_timeout: std::time::Duration,
    /// SO_RCVBUF requested on the accepted socket (spec.md §6).
    pub socket_receive_buffer_size: usize,
    /// Capacity of the userland `BufReader` wrapping the socket (spec.md §6).
    pub input_buffer_size: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        ConnectionLimits {
            max_frame_len: 64 * 1024 * 1024,
            max_schema_len: 1 << 20,
            schema_wait_timeout: std::time::Duration::from_secs(10),
            socket_receive_buffer_size: 1 << 20,
            input_buffer_size: 64 * 1024,
        }
    }
}

/// Sets SO_RCVBUF on a duplicate of `stream`'s file descriptor; the option
/// is a property of the underlying socket, so it applies to `stream` too.
fn apply_recv_buffer_size(stream: &TcpStream, size: usize) -> std::io::Result<()> {
    let dup = stream.try_clone()?;
    let socket = socket2::Socket::from(dup);
    socket.set_recv_buffer_size(size)
}

/// Handles one accepted socket end to end. Never panics on malformed
/// input; every failure path writes a single-line error string back and
/// closes, per spec.md §4.3 "Failure semantics".
pub fn handle_connection(
    stream: TcpStream,
    registry: Arc<Registry>,
    tz_offset_seconds: i64,
    limits: &ConnectionLimits,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%peer, error = %e, "failed to set TCP_NODELAY");
    }
    if let Err(e) = apply_recv_buffer_size(&stream, limits.socket_receive_buffer_size) {
        warn!(%peer, error = %e, "failed to set SO_RCVBUF");
    }

    let mut reader = BufReader::with_capacity(limits.input_buffer_size, stream.try_clone().expect("clone connection socket"));
    let mut writer = stream;

    if let Err(e) = run(&mut reader, &mut writer, &registry, tz_offset_seconds, limits) {
        debug!(%peer, error = %e, "connection closed with error");
        let _ = writer.write_all(e.to_string().as_bytes());
    }
}

fn run<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    registry: &Registry,
    tz_offset_seconds: i64,
    limits: &ConnectionLimits,
) -> Result<(), BridgeError> {
    let token = read_token(reader).map_err(wire_to_bridge)?;
    match read_opcode(reader).map_err(wire_to_bridge)? {
        ConnectionKind::Data { qid } => handle_data(reader, writer, registry, &qid, &token, tz_offset_seconds, limits),
        ConnectionKind::Control { qid } => handle_control(reader, writer, registry, &qid, &token),
    }
}

fn handle_data<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    registry: &Registry,
    qid: &str,
    token: &str,
    tz_offset_seconds: i64,
    limits: &ConnectionLimits,
) -> Result<(), BridgeError> {
    if !registry.validate_token(qid, token) {
        return Err(BridgeError::Unauthorized { qid: qid.to_string() });
    }

    let preamble = read_data_preamble(reader, limits.max_schema_len).map_err(wire_to_bridge)?;
    let columns = registry
        .wait_for_schema(qid, limits.schema_wait_timeout)
        .map_err(|_| BridgeError::SchemaNotRegistered {
            qid: qid.to_string(),
            retries: 0,
        })?;
    debug_assert!(!columns.is_empty() || preamble.columns.is_empty());

    let profile = registry.profile(qid)?;
    registry.increment_producers(qid)?;

    let mut decompress_buf = DecompressBuffer::new();
    let result = (|| -> Result<(), BridgeError> {
        loop {
            let raw = read_frame(reader, limits.max_frame_len).map_err(wire_to_bridge)?;
            if raw.is_empty() {
                break;
            }
            profile.add_bytes_read(raw.len() as u64);
            let decompressed = decompress_buf
                .decompress(&raw, preamble.compression)
                .map_err(wire_to_bridge)?;
            profile.add_bytes_decompressed(decompressed.len() as u64);

            let decode_start = Instant::now();
            let page = decode::decode_batch(decompressed, &columns, tz_offset_seconds).map_err(wire_to_bridge)?;
            profile.add_decode_time(decode_start.elapsed());

            if let Some(page) = page {
                let enqueue_start = Instant::now();
                registry.push_page(qid, page)?;
                profile.add_enqueue_time(enqueue_start.elapsed());
                profile.add_page();
            }
        }
        Ok(())
    })();

    // decrement_producers must run regardless of how the loop above ended,
    // so a dropped connection still lets EOS be reached (spec.md §4.3).
    registry.decrement_producers(qid)?;

    result?;
    writer.write_all(b"OK").map_err(|e| BridgeError::MalformedFrame(e.to_string()))?;
    Ok(())
}

fn handle_control<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    registry: &Registry,
    qid: &str,
    token: &str,
) -> Result<(), BridgeError> {
    let command = read_command(reader).map_err(wire_to_bridge)?;

    // JOB_FINISHED only needs format validation — token and query-id were
    // already parsed as length-prefixed strings by the wire layer. Every
    // other control command requires full registry token validation
    // (spec.md §4.3 "failure semantics").
    if command == CMD_JOB_FINISHED {
        registry.signal_job_finished(qid)?;
    } else {
        if !registry.validate_token(qid, token) {
            return Err(BridgeError::Unauthorized { qid: qid.to_string() });
        }
        // other command codes are reserved: no-op once validated.
    }
    writer.write_all(b"OK").map_err(|e| BridgeError::MalformedFrame(e.to_string()))?;
    Ok(())
}

fn wire_to_bridge(e: WireError) -> BridgeError {
    match e {
        WireError::MalformedFrame(s) => BridgeError::MalformedFrame(s),
        WireError::TokenTooLarge => BridgeError::MalformedFrame("token too large".into()),
        WireError::UnsupportedCompression(tag) => BridgeError::UnsupportedCompression(tag),
        WireError::UnknownTag(tag) => BridgeError::UnknownTag(tag),
        WireError::DecompressionBufferOverflow => {
            BridgeError::MalformedFrame("decompression buffer overflow".into())
        }
        WireError::Io(e) => BridgeError::MalformedFrame(e.to_string()),
        WireError::SchemaJson(e) => BridgeError::MalformedFrame(e.to_string()),
    }
}
