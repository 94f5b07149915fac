use std::cmp::max;
use tracing::{debug, trace, warn};
use crate::config::FramingConfig;
use crate::error::{FramingError, PayloadDecodeError};
use crate::frame_header::FrameHeader;
use crate::payload::{Message, PayloadEncoding};
use crate::safe_converter::SafeCast;
use crate::transport::{ReadOutcome, StreamReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblyState {
    /// waiting for the transport to find the start of a frame
    SeekingSync,
    AwaitingHeader,
    AwaitingPayload,
    /// terminal, after explicit shutdown or an unrecoverable transport error
    Stopped,
}

/// The outcome of a single [Reassembler::poll] call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// a frame was completed and decoded
    Message(Message),
    /// a frame was completed, but its payload could not be decoded
    DecodeFailed(PayloadDecodeError),
    /// the state machine moved forward without completing a frame - poll again right away
    Progress,
    /// the stream has nothing to offer right now - yield before polling again
    Idle,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub messages_delivered: u64,
    pub decode_errors: u64,
    /// number of times the transport found a frame start to re-synchronize with
    pub syncs: u64,
    pub invalid_headers: u64,
    pub broken_signals: u64,
}

/// The receiver side of the protocol: a pull-based state machine that reads frames from a
///  stream and turns them into messages.
///
/// All buffered data belongs to this state machine, and there is at most one frame in the
///  buffer at any time. Each call to [Reassembler::poll] performs at most one non-blocking
///  operation on the stream, so it can be driven by a dedicated thread, an async task or any
///  other scheduler.
///
/// Framing problems (invalid headers, stream discontinuities) are handled here by discarding
///  buffered data and re-synchronizing. They are only visible in logs and [ReassemblerStats].
pub struct Reassembler {
    max_frame_len: u16,
    encoding: PayloadEncoding,

    state: ReassemblyState,
    synchronized: bool,

    /// holds the frame currently being received, header included
    receive_buffer: Vec<u8>,
    bytes_buffered: usize,
    /// the length from the current frame's header, or 0 while the header is not complete
    declared_len: usize,

    stats: ReassemblerStats,
}

impl Reassembler {
    pub fn new(config: &FramingConfig) -> anyhow::Result<Reassembler> {
        config.validate()?;

        Ok(Reassembler {
            max_frame_len: config.max_frame_len,
            encoding: config.payload_encoding,
            state: ReassemblyState::SeekingSync,
            synchronized: false,
            receive_buffer: vec![0; max(config.max_frame_len.safe_cast(), FrameHeader::SERIALIZED_LEN)],
            bytes_buffered: 0,
            declared_len: 0,
            stats: ReassemblerStats::default(),
        })
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// true once a clean header was decoded after the last frame start the transport found,
    ///  until the next discontinuity or invalid header
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn bytes_buffered(&self) -> usize {
        self.bytes_buffered
    }

    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Stops the state machine, discarding a partially received frame. This is safe in every
    ///  state, and all subsequent calls to [Reassembler::poll] return [Step::Stopped].
    pub fn stop(&mut self) {
        if self.state == ReassemblyState::Stopped {
            return;
        }
        if self.bytes_buffered > 0 {
            debug!("stopping with {} bytes of an incomplete frame buffered - discarding", self.bytes_buffered);
        }
        self.reset_buffer();
        self.synchronized = false;
        self.state = ReassemblyState::Stopped;
    }

    /// Performs the next step of reassembly. An `Err` is an unrecoverable transport failure, and
    ///  it stops the state machine.
    pub fn poll(&mut self, reader: &mut dyn StreamReader) -> std::io::Result<Step> {
        let result = match self.state {
            ReassemblyState::Stopped => return Ok(Step::Stopped),
            ReassemblyState::SeekingSync => self.poll_seeking_sync(reader),
            ReassemblyState::AwaitingHeader => self.poll_header(reader),
            ReassemblyState::AwaitingPayload => self.poll_payload(reader),
        };

        if let Err(e) = &result {
            warn!("unrecoverable transport error in state {:?}: {}", self.state, e);
            self.stop();
        }
        result
    }

    fn poll_seeking_sync(&mut self, reader: &mut dyn StreamReader) -> std::io::Result<Step> {
        if !reader.seek_frame_start()? {
            trace!("no frame start available - still seeking");
            return Ok(Step::Idle);
        }

        debug!("transport found a frame start");
        self.reset_buffer();
        self.stats.syncs += 1;
        self.state = ReassemblyState::AwaitingHeader;
        Ok(Step::Progress)
    }

    fn poll_header(&mut self, reader: &mut dyn StreamReader) -> std::io::Result<Step> {
        if !self.read_into_buffer(reader, FrameHeader::SERIALIZED_LEN)? {
            return Ok(Step::Idle);
        }
        if self.state == ReassemblyState::SeekingSync {
            // stream broke while reading
            return Ok(Step::Progress);
        }
        if self.bytes_buffered < FrameHeader::SERIALIZED_LEN {
            return Ok(Step::Progress);
        }

        let mut header_buf = &self.receive_buffer[..FrameHeader::SERIALIZED_LEN];
        let header = match FrameHeader::deser(&mut header_buf) {
            Ok(header) => header,
            Err(e) => {
                // we checked the buffered length above
                return Err(std::io::Error::other(e));
            }
        };

        if let Err(e) = header.validate(self.max_frame_len) {
            // NB: the header bytes are not reinterpreted at some other offset - the transport
            //      has to find the next frame start
            self.stats.invalid_headers += 1;
            self.lose_sync(e);
            return Ok(Step::Progress);
        }

        if !self.synchronized {
            debug!("synchronized with stream");
            self.synchronized = true;
        }
        self.declared_len = header.frame_len.safe_cast();
        trace!("frame header declares length {}", self.declared_len);

        if self.declared_len == FrameHeader::SERIALIZED_LEN {
            return Ok(self.complete_frame());
        }
        self.state = ReassemblyState::AwaitingPayload;
        Ok(Step::Progress)
    }

    fn poll_payload(&mut self, reader: &mut dyn StreamReader) -> std::io::Result<Step> {
        if !self.read_into_buffer(reader, self.declared_len)? {
            return Ok(Step::Idle);
        }
        if self.state == ReassemblyState::SeekingSync {
            return Ok(Step::Progress);
        }
        if self.bytes_buffered < self.declared_len {
            return Ok(Step::Progress);
        }
        Ok(self.complete_frame())
    }

    /// Reads up to `target_len - bytes_buffered` bytes. Returns `false` if nothing was read,
    ///  leaving all state unchanged. A broken stream is handled here by going back to
    ///  [ReassemblyState::SeekingSync] and returning `true`.
    fn read_into_buffer(&mut self, reader: &mut dyn StreamReader, target_len: usize) -> std::io::Result<bool> {
        debug_assert!(self.bytes_buffered < target_len);

        let requested = target_len - self.bytes_buffered;
        match reader.read(&mut self.receive_buffer[self.bytes_buffered..target_len])? {
            ReadOutcome::Data(0) => {
                trace!("read 0 bytes");
                Ok(false)
            }
            ReadOutcome::Data(n) if n > requested => {
                Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("transport reported {} bytes read into a buffer of {} bytes", n, requested)))
            }
            ReadOutcome::Data(n) => {
                trace!("read {} of {} requested bytes", n, requested);
                self.bytes_buffered += n;
                Ok(true)
            }
            ReadOutcome::Broken => {
                self.stats.broken_signals += 1;
                self.lose_sync(FramingError::TransportBroken);
                Ok(true)
            }
        }
    }

    fn complete_frame(&mut self) -> Step {
        let payload = &self.receive_buffer[FrameHeader::SERIALIZED_LEN..self.declared_len];
        let result = match self.encoding.decode(payload) {
            Ok(message) => {
                trace!("received message of length {}", message.len());
                self.stats.messages_delivered += 1;
                Step::Message(message)
            }
            Err(e) => {
                // the frame boundary is intact, so this does not affect synchronization
                debug!("{}", e);
                self.stats.decode_errors += 1;
                Step::DecodeFailed(e)
            }
        };

        self.reset_buffer();
        self.state = ReassemblyState::AwaitingHeader;
        result
    }

    fn lose_sync(&mut self, reason: FramingError) {
        warn!("{} after {} buffered bytes (declared frame length {}) - discarding and re-synchronizing", reason, self.bytes_buffered, self.declared_len);
        self.reset_buffer();
        self.synchronized = false;
        self.state = ReassemblyState::SeekingSync;
    }

    fn reset_buffer(&mut self) {
        self.bytes_buffered = 0;
        self.declared_len = 0;
    }
}
