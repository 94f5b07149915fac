use bytes::{Buf, BufMut, BytesMut};
use crate::error::{FramingError, SendError};
use crate::safe_converter::{PrecheckedCast, SafeCast};

/// The 2-byte length prefix of a frame. `frame_len` counts the header itself plus the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_len: u16,
}

impl FrameHeader {
    pub const SERIALIZED_LEN: usize = std::mem::size_of::<u16>();
    pub const SERIALIZED_LEN_U16: u16 = Self::SERIALIZED_LEN as u16;

    pub const DEFAULT_MAX_FRAME_LEN: u16 = 2048;

    /// Oversize payloads are rejected rather than truncated: a frame must never declare a
    ///  length that differs from what is actually written.
    pub fn for_payload(payload: &[u8], max_frame_len: u16) -> Result<FrameHeader, SendError> {
        let max_frame_len_usize: usize = max_frame_len.safe_cast();
        if payload.len() + Self::SERIALIZED_LEN > max_frame_len_usize {
            return Err(SendError::MessageTooLarge {
                message_len: payload.len(),
                max_frame_len,
            });
        }
        Ok(FrameHeader {
            frame_len: (payload.len() + Self::SERIALIZED_LEN).prechecked_cast(),
        })
    }

    pub fn payload_len(&self) -> usize {
        let frame_len: usize = self.frame_len.safe_cast();
        frame_len.saturating_sub(Self::SERIALIZED_LEN)
    }

    pub fn validate(&self, max_frame_len: u16) -> Result<(), FramingError> {
        if self.frame_len < Self::SERIALIZED_LEN_U16 || self.frame_len > max_frame_len {
            return Err(FramingError::InvalidFrameHeader {
                declared_len: self.frame_len,
                max_frame_len,
            });
        }
        Ok(())
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.frame_len);
    }

    /// NB: This only parses the header, it does not check the declared length against any limit
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Self> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            anyhow::bail!("incomplete frame header: {} bytes", buf.remaining());
        }
        Ok(FrameHeader {
            frame_len: buf.get_u16(),
        })
    }
}

/// Append a complete frame for `payload` to `buf`
pub fn encode_frame(payload: &[u8], max_frame_len: u16, buf: &mut BytesMut) -> Result<FrameHeader, SendError> {
    let header = FrameHeader::for_payload(payload, max_frame_len)?;
    buf.reserve(header.frame_len.into());
    header.ser(buf);
    buf.put_slice(payload);
    Ok(header)
}

/// Split a complete, contiguous frame into its header and payload. This is the one-shot
///  counterpart of [encode_frame]; the stream-based receiver is [crate::reassembler::Reassembler].
pub fn decode_frame(mut frame: &[u8], max_frame_len: u16) -> anyhow::Result<&[u8]> {
    let header = FrameHeader::deser(&mut frame)?;
    header.validate(max_frame_len)?;
    if frame.len() != header.payload_len() {
        anyhow::bail!("frame declares a payload of {} bytes but has {}", header.payload_len(), frame.len());
    }
    Ok(frame)
}
