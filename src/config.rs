use std::time::Duration;
use anyhow::bail;
use crate::frame_header::FrameHeader;
use crate::payload::PayloadEncoding;
use crate::safe_converter::SafeCast;
use crate::transport::FlushMode;

pub struct FramingConfig {
    /// This is the upper limit for the total length of a frame, *including* the 2-byte header.
    ///  Sender and receiver must agree on this value: a sender with a bigger limit produces
    ///  frames that the receiver treats as a loss of synchronization.
    ///
    /// The receiver allocates a receive buffer of this size per stream.
    pub max_frame_len: u16,

    /// The encoding the receiver decodes complete payloads with. The sender writes payload bytes
    ///  as they are.
    pub payload_encoding: PayloadEncoding,

    /// The flush that is requested from the transport after each complete frame. Flushing is
    ///  always non-blocking.
    pub flush_mode: FlushMode,

    /// Controls how long the receive loop waits before polling again when the stream has no data
    ///  or no frame start available
    pub resync_backoff: BackoffConfig,

    /// used for tracing only
    pub stream_name: String,

    /// The identity this node announces in its `connect` / `disconnect` presence messages
    pub sender_handle: String,

    /// If true, the sender endpoint sends a presence message when it is started and when it is
    ///  stopped
    pub announce_presence: bool,
}

impl FramingConfig {
    /// The values of the reference deployment: 2048 byte frames, US-ASCII payloads, passive flush
    pub fn default_reference() -> FramingConfig {
        FramingConfig {
            max_frame_len: FrameHeader::DEFAULT_MAX_FRAME_LEN,
            payload_encoding: PayloadEncoding::Ascii,
            flush_mode: FlushMode::Passive,
            resync_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(100),
                growth_factor_eighths: 16,
            },
            stream_name: "default".to_string(),
            sender_handle: "UNK".to_string(),
            announce_presence: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_frame_len < FrameHeader::SERIALIZED_LEN_U16 {
            bail!("maximum frame length {} is too small to hold the frame header", self.max_frame_len);
        }

        self.resync_backoff.validate()?;

        if self.announce_presence {
            // the handle is embedded verbatim in an XML attribute, and receivers decode US-ASCII
            //  by default
            if let Some(c) = self.sender_handle.chars().find(|c| !is_valid_handle_char(*c)) {
                bail!("sender handle {:?} contains {:?}: only printable US-ASCII without XML markup characters is allowed", self.sender_handle, c);
            }

            let max_payload_len = self.max_payload_len();
            for announcement in [self.connect_announcement(), self.disconnect_announcement()] {
                if announcement.len() > max_payload_len {
                    bail!("sender handle {:?} is too long: presence message does not fit into a frame of {} bytes", self.sender_handle, self.max_frame_len);
                }
            }
        }

        Ok(())
    }

    pub fn max_payload_len(&self) -> usize {
        let max_frame_len: usize = self.max_frame_len.safe_cast();
        max_frame_len - FrameHeader::SERIALIZED_LEN
    }

    pub fn connect_announcement(&self) -> String {
        format!("<MESSAGE type=\"connect\" sender=\"{}\"></MESSAGE>", self.sender_handle)
    }

    pub fn disconnect_announcement(&self) -> String {
        format!("<MESSAGE type=\"disconnect\" sender=\"{}\"></MESSAGE>", self.sender_handle)
    }
}

fn is_valid_handle_char(c: char) -> bool {
    (c.is_ascii_graphic() || c == ' ') && !matches!(c, '"' | '\'' | '<' | '>' | '&')
}

pub struct BackoffConfig {
    /// The delay after the first poll that finds nothing to do. This must not be zero since the
    ///  receive loop would spin otherwise.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// growth factor per idle poll in units of 1/8, i.e. 16 doubles the delay each time
    pub growth_factor_eighths: u32,
}

impl BackoffConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_delay.is_zero() {
            bail!("initial backoff delay must be greater than zero");
        }
        if self.max_delay < self.initial_delay {
            bail!("maximum backoff delay {:?} is smaller than the initial delay {:?}", self.max_delay, self.initial_delay);
        }
        if self.growth_factor_eighths < 8 {
            bail!("backoff growth factor {}/8 would shrink the delay", self.growth_factor_eighths);
        }
        Ok(())
    }
}
