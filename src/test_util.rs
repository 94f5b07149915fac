use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::error::PayloadDecodeError;
use crate::payload::Message;
use crate::receive_loop::MessageSink;

/// convenience function for unit test code: the wire representation of a frame with the given
///  payload
pub fn test_frame(payload: &[u8]) -> Vec<u8> {
    let mut result = ((payload.len() + 2) as u16).to_be_bytes().to_vec();
    result.extend_from_slice(payload);
    result
}

pub fn text(s: &str) -> Message {
    Message::Text(s.to_string())
}

#[derive(Default)]
pub struct TrackingMessageSink {
    messages: Arc<RwLock<Vec<Message>>>,
    decode_errors: Arc<RwLock<Vec<PayloadDecodeError>>>,
}
impl TrackingMessageSink {
    /// returns received messages, clearing the internal buffer
    pub async fn received_messages(&self) -> Vec<Message> {
        let mut lock = self.messages.write().await;
        std::mem::take(&mut *lock)
    }

    pub async fn num_decode_errors(&self) -> usize {
        self.decode_errors.read().await.len()
    }

    /// waits until at least `n` messages were received, returning them and clearing the internal
    ///  buffer. Intended for tests with paused time.
    pub async fn wait_for_messages(&self, n: usize) -> Vec<Message> {
        for _ in 0..1000 {
            if self.messages.read().await.len() >= n {
                return self.received_messages().await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} messages, received {:?}", n, *self.messages.read().await);
    }

    pub async fn assert_no_remaining_messages(&self) {
        assert!(
            self.messages.read().await
                .is_empty()
        );
    }
}

#[async_trait]
impl MessageSink for TrackingMessageSink {
    async fn on_message(&self, message: Message) -> anyhow::Result<()> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn on_decode_error(&self, error: PayloadDecodeError) -> anyhow::Result<()> {
        self.decode_errors.write().await.push(error);
        Ok(())
    }
}

/// a sink whose deliveries never complete
pub struct StuckMessageSink;

#[async_trait]
impl MessageSink for StuckMessageSink {
    async fn on_message(&self, _message: Message) -> anyhow::Result<()> {
        std::future::pending().await
    }

    async fn on_decode_error(&self, _error: PayloadDecodeError) -> anyhow::Result<()> {
        std::future::pending().await
    }
}
