//! Error taxonomy for the ingestion bridge (spec §7).
//!
//! Connection-level errors (`WireError`) terminate only the connection that
//! raised them; they are converted into a `BridgeError` only at the point a
//! caller needs to report them to the registry or to logging. Query-level
//! errors (`BridgeError::ProducerJobFailed`, `Cancelled`) sweep the whole
//! query.

/// Errors raised while framing, decompressing, or decoding a single
/// connection's byte stream. Never escapes a connection handler.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("token or query-id exceeds the 1024 byte limit")]
    TokenTooLarge,

    #[error("unsupported compression algorithm tag {0}")]
    UnsupportedCompression(i32),

    #[error("unknown wire-type tag {0:?}")]
    UnknownTag(String),

    #[error("decompression buffer exceeded the 32 MiB cap")]
    DecompressionBufferOverflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid schema JSON: {0}")]
    SchemaJson(#[from] serde_json::Error),
}

/// Query-level and handshake-level errors (spec §7 taxonomy).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unauthorized: token missing or mismatched for query {qid}")]
    Unauthorized { qid: String },

    #[error("unsupported compression algorithm tag {0}")]
    UnsupportedCompression(i32),

    #[error("unknown wire-type tag {0:?}")]
    UnknownTag(String),

    #[error("schema not registered for query {qid} after {retries} retries")]
    SchemaNotRegistered { qid: String, retries: u32 },

    #[error("pull side never drained query {qid}; evicted after TTL")]
    BackpressureTimeout { qid: String },

    #[error("producer job failed for query {qid}: {reason}")]
    ProducerJobFailed { qid: String, reason: String },

    #[error("query {qid} was cancelled")]
    Cancelled { qid: String },

    #[error("query {qid} is already registered")]
    Duplicate { qid: String },

    #[error("query {qid} is unknown to the registry")]
    UnknownQuery { qid: String },
}

impl BridgeError {
    /// Stable taxonomy label, attached to tracing events and logs per
    /// SPEC_FULL's observability interface.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MalformedFrame(_) => "MalformedFrame",
            BridgeError::Unauthorized { .. } => "Unauthorized",
            BridgeError::UnsupportedCompression(_) => "UnsupportedCompression",
            BridgeError::UnknownTag(_) => "UnknownTag",
            BridgeError::SchemaNotRegistered { .. } => "SchemaNotRegistered",
            BridgeError::BackpressureTimeout { .. } => "BackpressureTimeout",
            BridgeError::ProducerJobFailed { .. } => "ProducerJobFailed",
            BridgeError::Cancelled { .. } => "Cancelled",
            BridgeError::Duplicate { .. } => "Duplicate",
            BridgeError::UnknownQuery { .. } => "UnknownQuery",
        }
    }
}
