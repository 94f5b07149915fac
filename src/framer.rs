use std::sync::Arc;
use bytes::BytesMut;
use tracing::{debug, trace, warn};
use crate::config::FramingConfig;
use crate::error::SendError;
use crate::frame_header::encode_frame;
use crate::transport::{FlushMode, StreamWriter};

/// The sender side of the protocol: turns one message into one frame and writes it to a stream.
///
/// The stream is passed in for each call rather than owned by the framer. The framer does not
///  serialize concurrent senders - callers that share a stream must make sure that calls to
///  [Framer::send] for that stream do not interleave (see [crate::endpoint::SenderEndpoint]).
pub struct Framer {
    config: Arc<FramingConfig>,
    /// reused for all frames to avoid an allocation per message
    frame_buf: BytesMut,
}

impl Framer {
    pub fn new(config: Arc<FramingConfig>) -> anyhow::Result<Framer> {
        config.validate()?;

        let frame_buf = BytesMut::with_capacity(config.max_frame_len.into());
        Ok(Framer {
            config,
            frame_buf,
        })
    }

    /// Writes `message` as a single frame, returning the number of bytes written (i.e. the frame
    ///  length) on success.
    ///
    /// NB: This does no retries. After [SendError::Backpressure], part of the frame is on the
    ///      wire, and the receiver will notice the incomplete frame only when the transport
    ///      reports a discontinuity or the following bytes fail to form a valid header
    pub fn send(&mut self, writer: &mut dyn StreamWriter, message: &[u8]) -> Result<usize, SendError> {
        self.frame_buf.clear();
        let header = match encode_frame(message, self.config.max_frame_len, &mut self.frame_buf) {
            Ok(header) => header,
            Err(e) => {
                warn!("rejecting message on stream {}: {}", self.config.stream_name, e);
                return Err(e);
            }
        };
        let frame_len = self.frame_buf.len();
        debug_assert_eq!(frame_len, usize::from(header.frame_len));

        trace!("writing frame of length {} to stream {}", frame_len, self.config.stream_name);
        let accepted = writer.write(&self.frame_buf)?;

        if accepted < frame_len {
            warn!("transmit buffer full on stream {}: only {} of {} frame bytes were accepted", self.config.stream_name, accepted, frame_len);
            return Err(SendError::Backpressure { accepted, frame_len });
        }

        if self.config.flush_mode != FlushMode::None {
            if let Err(source) = writer.flush(false, self.config.flush_mode) {
                warn!("flush failed on stream {} after writing a complete frame: {}", self.config.stream_name, source);
                return Err(SendError::FlushFailed { frame_len, source });
            }
        }

        debug!("sent message of length {} on stream {}", message.len(), self.config.stream_name);
        Ok(frame_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStream;
    use crate::transport::MockStreamWriter;
    use mockall::Sequence;
    use rstest::rstest;

    fn framer(flush_mode: FlushMode) -> Framer {
        Framer::new(Arc::new(FramingConfig {
            flush_mode,
            ..FramingConfig::default_reference()
        })).unwrap()
    }

    #[test]
    fn test_send_connect_alice() {
        let mut expected = vec![0x00, 0x0f];
        expected.extend_from_slice(b"connect:alice");

        let mut seq = Sequence::new();
        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .in_sequence(&mut seq)
            .withf(move |buf| buf == expected.as_slice())
            .returning(|buf| Ok(buf.len()));
        writer.expect_flush()
            .once()
            .in_sequence(&mut seq)
            .withf(|blocking, mode| !*blocking && *mode == FlushMode::Passive)
            .returning(|_, _| Ok(()));

        let mut framer = framer(FlushMode::Passive);
        assert_eq!(framer.send(&mut writer, b"connect:alice").unwrap(), 15);
    }

    #[rstest]
    #[case::empty(0)]
    #[case::one(1)]
    #[case::max(2046)]
    fn test_send_lengths(#[case] len: usize) {
        let message = vec![b'a'; len];
        let expected_header = ((len + 2) as u16).to_be_bytes();

        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .withf(move |buf| buf.len() == len + 2 && buf[..2] == expected_header && buf[2..].iter().all(|&b| b == b'a'))
            .returning(|buf| Ok(buf.len()));
        writer.expect_flush()
            .once()
            .returning(|_, _| Ok(()));

        assert_eq!(framer(FlushMode::Passive).send(&mut writer, &message).unwrap(), len + 2);
    }

    #[test]
    fn test_send_too_large_writes_nothing() {
        let mut writer = MockStreamWriter::new();
        writer.expect_write().never();
        writer.expect_flush().never();

        match framer(FlushMode::Passive).send(&mut writer, &[0; 2047]) {
            Err(SendError::MessageTooLarge { message_len: 2047, max_frame_len: 2048 }) => {}
            other => panic!("expected MessageTooLarge, got {:?}", other),
        }
    }

    #[rstest]
    #[case::nothing_accepted(0)]
    #[case::header_only(2)]
    #[case::one_short(14)]
    fn test_send_backpressure(#[case] accepted: usize) {
        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .returning(move |_| Ok(accepted));
        writer.expect_flush().never();

        match framer(FlushMode::Passive).send(&mut writer, b"connect:alice") {
            Err(SendError::Backpressure { accepted: a, frame_len }) => {
                assert_eq!(a, accepted);
                assert_eq!(frame_len, 15);
            }
            other => panic!("expected Backpressure, got {:?}", other),
        }
    }

    #[test]
    fn test_send_without_flush() {
        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .returning(|buf| Ok(buf.len()));
        writer.expect_flush().never();

        framer(FlushMode::None).send(&mut writer, b"x").unwrap();
    }

    #[test]
    fn test_send_io_error() {
        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")));

        assert!(matches!(framer(FlushMode::Passive).send(&mut writer, b"x"), Err(SendError::Io(_))));
    }

    #[test]
    fn test_send_flush_error_is_distinct_from_write_error() {
        let stream = MemoryStream::new(4096);
        let mut memory_writer = stream.writer();

        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .returning(move |buf| memory_writer.write(buf));
        writer.expect_flush()
            .once()
            .returning(|_, _| Err(std::io::Error::new(std::io::ErrorKind::Other, "flush failed")));

        match framer(FlushMode::Passive).send(&mut writer, b"hello") {
            Err(SendError::FlushFailed { frame_len: 7, source }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::Other);
            }
            other => panic!("expected FlushFailed, got {:?}", other),
        }
        // the frame is on the wire regardless
        assert_eq!(stream.contents(), b"\x00\x07hello");
    }

    #[test]
    fn test_buffer_is_reused_between_frames() {
        let mut seq = Sequence::new();
        let mut writer = MockStreamWriter::new();
        writer.expect_write()
            .once()
            .in_sequence(&mut seq)
            .withf(|buf| buf == b"\x00\x05abc")
            .returning(|buf| Ok(buf.len()));
        writer.expect_write()
            .once()
            .in_sequence(&mut seq)
            .withf(|buf| buf == b"\x00\x03d")
            .returning(|buf| Ok(buf.len()));
        writer.expect_flush()
            .times(2)
            .returning(|_, _| Ok(()));

        let mut framer = framer(FlushMode::Active);
        framer.send(&mut writer, b"abc").unwrap();
        framer.send(&mut writer, b"d").unwrap();
    }
}
