use anyhow::bail;
use async_trait::async_trait;
use tracing::debug;

/// The lifecycle of an endpoint. States are traversed in order, and stopping is irreversible:
///  an endpoint can not be restarted after it was stopped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LifecycleState {
    /// constructed, but no resources are acquired yet
    Created,
    /// configuration is validated, and the endpoint is ready to start
    Initialized,
    /// A sender accepts messages, a receiver delivers them
    Running,
    /// This is a terminal state. Messages are neither sent nor delivered, and a partially
    ///  received frame was discarded.
    Stopped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!((self, next),
            (Created, Initialized) |
            (Initialized, Running) |
            (Created | Initialized | Running, Stopped)
        )
    }

    pub fn transition_to(&mut self, next: LifecycleState) -> anyhow::Result<()> {
        if !self.can_transition_to(next) {
            bail!("invalid lifecycle transition from {:?} to {:?}", self, next);
        }
        debug!("lifecycle transition {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self == LifecycleState::Running
    }
}

/// Explicit lifecycle of an endpoint that owns a stream.
///
/// `stop` is idempotent and may be called in any state.
#[async_trait]
pub trait ManagedLifecycle: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()>;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn lifecycle_state(&self) -> LifecycleState;
}
