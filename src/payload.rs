use std::fmt::{Display, Formatter};
use bytes::Bytes;
use crate::error::PayloadDecodeError;

/// A decoded message as it is handed to the consumer. Messages are immutable and delivered
///  exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Binary(Bytes),
    Text(String),
}

impl Message {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Binary(b) => b.as_ref(),
            Message::Text(s) => s.as_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Binary(_) => None,
            Message::Text(s) => Some(s),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The encoding the receiver expects message payloads in. The framing itself is
///  payload-agnostic, this only affects how a complete payload is turned into a [Message].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// opaque bytes, decoding never fails
    Binary,
    Utf8,
    /// 7-bit US-ASCII text
    #[default]
    Ascii,
}

impl Display for PayloadEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadEncoding::Binary => write!(f, "binary"),
            PayloadEncoding::Utf8 => write!(f, "UTF-8"),
            PayloadEncoding::Ascii => write!(f, "US-ASCII"),
        }
    }
}

impl PayloadEncoding {
    pub fn decode(&self, payload: &[u8]) -> Result<Message, PayloadDecodeError> {
        match self {
            PayloadEncoding::Binary => Ok(Message::Binary(Bytes::copy_from_slice(payload))),
            PayloadEncoding::Utf8 => {
                match std::str::from_utf8(payload) {
                    Ok(s) => Ok(Message::Text(s.to_string())),
                    Err(e) => Err(self.decode_error(payload, e.valid_up_to())),
                }
            }
            PayloadEncoding::Ascii => {
                if let Some(offset) = payload.iter().position(|b| !b.is_ascii()) {
                    return Err(self.decode_error(payload, offset));
                }
                // all bytes are ASCII, so this is valid UTF-8
                Ok(Message::Text(String::from_utf8_lossy(payload).into_owned()))
            }
        }
    }

    fn decode_error(&self, payload: &[u8], offset: usize) -> PayloadDecodeError {
        PayloadDecodeError {
            encoding: *self,
            offset,
            payload_len: payload.len(),
            raw: Bytes::copy_from_slice(payload),
        }
    }
}
