//! Error types of the framing layer.
//!
//! Sender-side failures ([SendError]) and payload decoding failures ([PayloadDecodeError])
//!  concern a single message and are returned to the caller. [FramingError]s concern the
//!  channel's synchronization: the reassembler handles them itself by re-synchronizing, and
//!  they only show up in logs and statistics.

use bytes::Bytes;
use thiserror::Error;

use crate::payload::PayloadEncoding;

#[derive(Debug, Error)]
pub enum SendError {
    /// The message does not fit into a single frame. Nothing was written.
    #[error("message of {message_len} bytes does not fit into a frame of at most {max_frame_len} bytes")]
    MessageTooLarge { message_len: usize, max_frame_len: u16 },

    /// The transport accepted only part of the frame, so the frame is incomplete on the wire.
    #[error("transmit buffer full: transport accepted {accepted} of {frame_len} frame bytes")]
    Backpressure { accepted: usize, frame_len: usize },

    /// The complete frame was accepted by the transport, but the subsequent flush failed. The
    ///  message is on the wire, so retrying it would send a duplicate.
    #[error("frame of {frame_len} bytes was written, but flushing failed: {source}")]
    FlushFailed { frame_len: usize, source: std::io::Error },

    /// The sender is not in a state that accepts messages (not started yet or already stopped)
    #[error("sender is not running")]
    NotRunning,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("invalid frame header: declared length {declared_len} is outside [2, {max_frame_len}]")]
    InvalidFrameHeader { declared_len: u16, max_frame_len: u16 },

    #[error("transport reported a stream discontinuity")]
    TransportBroken,
}

/// A frame was received completely, but its payload is not valid in the configured encoding.
///  The raw payload is retained so consumers can still inspect it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{payload_len} byte payload is not valid {encoding}: invalid data at offset {offset}")]
pub struct PayloadDecodeError {
    pub encoding: PayloadEncoding,
    pub offset: usize,
    pub payload_len: usize,
    pub raw: Bytes,
}
