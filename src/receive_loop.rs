use std::sync::Arc;
use anyhow::Context;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, trace, Instrument};
use crate::backoff::ExponentialBackoff;
use crate::config::FramingConfig;
use crate::error::PayloadDecodeError;
use crate::payload::Message;
use crate::reassembler::{Reassembler, ReassemblerStats, Step};
use crate::transport::StreamReader;

/// The consumer of received messages. Each message is passed to the sink exactly once, in
///  stream order.
///
/// An `Err` from the sink terminates the receive loop and is returned to whoever runs it. A call
///  that is still pending when the loop is stopped is dropped, so the message may or may not
///  have been consumed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    async fn on_message(&self, message: Message) -> anyhow::Result<()>;

    /// called for a completely received frame with a payload that is invalid in the configured
    ///  encoding
    async fn on_decode_error(&self, error: PayloadDecodeError) -> anyhow::Result<()>;
}

/// Drives a [Reassembler] over a stream until it is stopped, passing messages to a sink.
///
/// The loop owns both the reader and the reassembler's buffer, so there is exactly one loop per
///  stream. When the stream has nothing to offer, the loop sleeps with exponential backoff
///  rather than spinning.
pub struct ReceiveLoop {
    config: Arc<FramingConfig>,
    reader: Box<dyn StreamReader>,
    reassembler: Reassembler,
    sink: Arc<dyn MessageSink>,
    backoff: ExponentialBackoff,
}

impl ReceiveLoop {
    pub fn new(config: Arc<FramingConfig>, reader: Box<dyn StreamReader>, sink: Arc<dyn MessageSink>) -> anyhow::Result<ReceiveLoop> {
        let reassembler = Reassembler::new(&config)?;
        let backoff = ExponentialBackoff::new(&config.resync_backoff);
        Ok(ReceiveLoop {
            config,
            reader,
            reassembler,
            sink,
            backoff,
        })
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }

    /// Runs until `stop` becomes `true` (or its sender is dropped), returning the final
    ///  statistics. Stopping discards a partially received frame.
    ///
    /// The loop terminates early with an error if the transport fails or the sink rejects a
    ///  message.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> anyhow::Result<ReassemblerStats> {
        let span = info_span!("receive_loop", stream = %self.config.stream_name);

        async move {
            info!("starting receive loop");
            let result = self.do_loop(&mut stop).await;
            self.reassembler.stop();

            match result {
                Ok(()) => {
                    info!("receive loop stopped: {:?}", self.reassembler.stats());
                    Ok(self.reassembler.stats())
                }
                Err(e) => {
                    error!("receive loop terminated: {:#}", e);
                    Err(e)
                }
            }
        }.instrument(span).await
    }

    async fn do_loop(&mut self, stop: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            if *stop.borrow() {
                debug!("stop requested");
                return Ok(());
            }

            let step = self.reassembler.poll(self.reader.as_mut())
                .context("stream transport failed")?;

            match step {
                Step::Message(message) => {
                    self.backoff.reset();
                    select! {
                        result = self.sink.on_message(message) => result.context("message sink failed")?,
                        _ = stop.changed() => {
                            debug!("stop requested while the sink was busy - abandoning delivery");
                            return Ok(());
                        }
                    }
                }
                Step::DecodeFailed(e) => {
                    self.backoff.reset();
                    select! {
                        result = self.sink.on_decode_error(e) => result.context("message sink failed to handle a decode error")?,
                        _ = stop.changed() => {
                            debug!("stop requested while the sink was busy - abandoning delivery");
                            return Ok(());
                        }
                    }
                }
                Step::Progress => {
                    self.backoff.reset();
                    tokio::task::yield_now().await;
                }
                Step::Idle => {
                    let delay = self.backoff.next_delay();
                    trace!("nothing to read - waiting {:?}", delay);
                    select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                debug!("stop handle was dropped");
                                return Ok(());
                            }
                        }
                    }
                }
                Step::Stopped => return Ok(()),
            }
        }
    }
}
