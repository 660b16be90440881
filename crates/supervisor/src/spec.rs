//! Supervised child description

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use sluice_transport::Pipe;

use crate::DEFAULT_RESTART_BACKOFF;

/// What to do when a supervised child dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart after a fixed backoff when the child exits non-zero or is
    /// killed by a signal. A clean exit is final.
    RestartOnError { backoff: Duration },

    /// Never restart; one crash is final.
    Never,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::RestartOnError {
            backoff: DEFAULT_RESTART_BACKOFF,
        }
    }
}

/// Callbacks from the supervisor into the child's owner.
#[async_trait]
pub trait ChildHandler: Send + Sync {
    /// A fresh process is up; its stdio is wrapped in `pipe`. Called again
    /// after every restart.
    async fn attached(&self, pipe: Pipe);

    /// The child crashed (spawn failure, non-zero exit, or signal death).
    fn crashed(&self, detail: &str);
}

/// Description of one supervised child.
pub struct ChildSpec {
    pub(crate) name: String,
    pub(crate) command: Box<dyn Fn() -> Command + Send + Sync>,
    pub(crate) handler: Arc<dyn ChildHandler>,
    pub(crate) policy: RestartPolicy,
}

impl ChildSpec {
    /// Describe a child. `command` builds a fresh [`Command`] for every
    /// spawn; the supervisor pipes stdin/stdout itself.
    pub fn new(
        name: impl Into<String>,
        command: impl Fn() -> Command + Send + Sync + 'static,
        handler: Arc<dyn ChildHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            command: Box::new(command),
            handler,
            policy: RestartPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSpec")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}
