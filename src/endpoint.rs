//! Endpoints bind the framing layer to one stream each and give it an explicit lifecycle.
//!
//! A [SenderEndpoint] serializes concurrent senders on its stream, so frames never interleave.
//!  A [ReceiverEndpoint] runs a [ReceiveLoop] as a tokio task while it is running.

use std::sync::Arc;
use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::config::FramingConfig;
use crate::error::SendError;
use crate::framer::Framer;
use crate::lifecycle::{LifecycleState, ManagedLifecycle};
use crate::reassembler::ReassemblerStats;
use crate::receive_loop::{MessageSink, ReceiveLoop};
use crate::transport::{StreamReader, StreamWriter};

struct SenderInner {
    state: LifecycleState,
    framer: Framer,
    writer: Box<dyn StreamWriter>,
}

impl SenderInner {
    fn send(&mut self, message: &[u8]) -> Result<usize, SendError> {
        self.framer.send(self.writer.as_mut(), message)
    }

    /// Presence messages are best effort: failing to send them does not affect the lifecycle
    fn announce(&mut self, announcement: &str) {
        match self.send(announcement.as_bytes()) {
            Ok(_) => debug!("announced presence: {}", announcement),
            Err(e) => warn!("failed to send presence message {:?}: {}", announcement, e),
        }
    }
}

pub struct SenderEndpoint {
    config: Arc<FramingConfig>,
    inner: Mutex<SenderInner>,
}

impl SenderEndpoint {
    pub fn new(config: Arc<FramingConfig>, writer: Box<dyn StreamWriter>) -> anyhow::Result<SenderEndpoint> {
        let framer = Framer::new(config.clone())?;
        Ok(SenderEndpoint {
            config,
            inner: Mutex::new(SenderInner {
                state: LifecycleState::Created,
                framer,
                writer,
            }),
        })
    }

    /// Sends a message as a single frame. Concurrent calls are serialized, and each frame is
    ///  written completely or reported as [SendError::Backpressure]. [SendError::FlushFailed]
    ///  means the frame is on the wire.
    pub async fn send(&self, message: &[u8]) -> Result<usize, SendError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running() {
            return Err(SendError::NotRunning);
        }
        inner.send(message)
    }

    pub async fn send_text(&self, text: &str) -> Result<usize, SendError> {
        self.send(text.as_bytes()).await
    }
}

#[async_trait]
impl ManagedLifecycle for SenderEndpoint {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.inner.lock().await
            .state.transition_to(LifecycleState::Initialized)
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state.transition_to(LifecycleState::Running)?;
        info!("sender on stream {} started", self.config.stream_name);

        if self.config.announce_presence {
            inner.announce(&self.config.connect_announcement());
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == LifecycleState::Stopped {
            return Ok(());
        }

        if inner.state.is_running() && self.config.announce_presence {
            inner.announce(&self.config.disconnect_announcement());
        }
        inner.state.transition_to(LifecycleState::Stopped)?;
        info!("sender on stream {} stopped", self.config.stream_name);
        Ok(())
    }

    async fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }
}

struct ReceiverInner {
    state: LifecycleState,
    /// moved into the receive loop on start
    reader: Option<Box<dyn StreamReader>>,
    stop_sender: Option<watch::Sender<bool>>,
    loop_handle: Option<JoinHandle<anyhow::Result<ReassemblerStats>>>,
    final_stats: Option<ReassemblerStats>,
}

pub struct ReceiverEndpoint {
    config: Arc<FramingConfig>,
    sink: Arc<dyn MessageSink>,
    inner: Mutex<ReceiverInner>,
}

impl Drop for ReceiverEndpoint {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.get_mut().loop_handle.take() {
            handle.abort();
        }
    }
}

impl ReceiverEndpoint {
    pub fn new(config: Arc<FramingConfig>, reader: Box<dyn StreamReader>, sink: Arc<dyn MessageSink>) -> anyhow::Result<ReceiverEndpoint> {
        config.validate()?;

        Ok(ReceiverEndpoint {
            config,
            sink,
            inner: Mutex::new(ReceiverInner {
                state: LifecycleState::Created,
                reader: Some(reader),
                stop_sender: None,
                loop_handle: None,
                final_stats: None,
            }),
        })
    }

    /// The receive statistics at the time the receive loop stopped, `None` before that
    pub async fn final_stats(&self) -> Option<ReassemblerStats> {
        self.inner.lock().await.final_stats
    }

    /// true if the receive loop terminated on its own, i.e. because the transport or the sink
    ///  failed. [ManagedLifecycle::stop] returns the failure.
    pub async fn has_failed(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state.is_running() && inner.loop_handle.as_ref().map_or(false, |h| h.is_finished())
    }
}

#[async_trait]
impl ManagedLifecycle for ReceiverEndpoint {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.inner.lock().await
            .state.transition_to(LifecycleState::Initialized)
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.can_transition_to(LifecycleState::Running) {
            return Err(anyhow!("receiver can not be started in state {:?}", inner.state));
        }

        let reader = inner.reader.take()
            .ok_or_else(|| anyhow!("receiver stream was already consumed"))?;
        let receive_loop = ReceiveLoop::new(self.config.clone(), reader, self.sink.clone())?;

        let (stop_sender, stop_receiver) = watch::channel(false);
        inner.loop_handle = Some(tokio::spawn(receive_loop.run(stop_receiver)));
        inner.stop_sender = Some(stop_sender);
        inner.state.transition_to(LifecycleState::Running)?;

        info!("receiver on stream {} started", self.config.stream_name);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == LifecycleState::Stopped {
            return Ok(());
        }
        inner.state.transition_to(LifecycleState::Stopped)?;

        if let Some(stop_sender) = inner.stop_sender.take() {
            // the loop may have terminated already, dropping the receiver
            let _ = stop_sender.send(true);
        }

        let Some(handle) = inner.loop_handle.take() else {
            info!("receiver on stream {} stopped before it was started", self.config.stream_name);
            return Ok(());
        };

        let stats = match handle.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => return Err(e.context("receive loop failed")),
            Err(e) => return Err(anyhow!("receive loop task failed: {}", e)),
        };

        info!("receiver on stream {} stopped: {:?}", self.config.stream_name, stats);
        inner.final_stats = Some(stats);
        Ok(())
    }

    async fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }
}
