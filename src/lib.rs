//! Length-prefixed message framing on top of a continuous, possibly interrupted byte stream.
//!
//! The underlying transport (e.g. a reliable multicast data stream) delivers bytes without any
//!  notion of message boundaries, and it may lose data, report gaps or refuse to accept writes
//!  when its transmit buffer is full. This crate adds discrete messages on top of such a stream:
//!
//! * The sender side ([framer::Framer]) prefixes each message with its length and writes it to
//!   the stream in a single write call
//! * The receiver side ([reassembler::Reassembler]) is a pull-based state machine that reads
//!   bytes as they become available, finds message boundaries based on the length prefix, and
//!   re-synchronizes with the stream after a discontinuity
//!
//! Sender and receiver never talk to each other directly, they only agree on the wire format.
//!  There is no acknowledgement, retransmission or ordering guarantee beyond what the stream
//!  itself provides, and there is exactly one logical channel per stream.
//!
//! ## Wire format
//!
//! All numbers in network byte order (BE):
//!
//! ```ascii
//! 0: frame length (u16) - total length of the frame *including* these two bytes, i.e. the
//!     smallest valid value is 2 (empty payload). The upper limit is configurable and
//!     defaults to 2048.
//! 2: payload (frame length - 2 bytes) - opaque to the framing layer; the receiver decodes it
//!     as binary, UTF-8 or US-ASCII depending on configuration
//! ```
//!
//! A frame declaring a length below 2 or above the configured maximum is never sent and never
//!  accepted: the receiver treats it as a loss of synchronization.
//!
//! ## Synchronization
//!
//! The receiver starts out unsynchronized and asks the transport to position the stream at the
//!  start of a frame ([transport::StreamReader::seek_frame_start]). From there, frames are read
//!  back-to-back. Whenever the transport reports a gap or a header turns out to be invalid,
//!  buffered bytes are discarded and the receiver goes back to seeking a frame start. Partially
//!  received messages are never delivered.
//!
//! ## Oversize messages and backpressure
//!
//! Messages that do not fit into a single frame are rejected before anything is written. If the
//!  transport accepts only part of a frame, the sender reports backpressure and does *not* write
//!  the rest separately - the receiver would have no way of telling the continuation apart from
//!  the start of a new frame. Retrying is up to the caller.

pub mod backoff;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame_header;
pub mod framer;
pub mod lifecycle;
pub mod memory;
pub mod payload;
pub mod reassembler;
pub mod receive_loop;
pub mod safe_converter;
pub mod transport;

#[cfg(test)] mod test_util;
