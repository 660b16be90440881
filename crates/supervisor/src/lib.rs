//! Sluice - Supervisor
//!
//! Owns a set of supervised child processes, one per external plugin. Each
//! child gets its stdio wrapped into a [`sluice_transport::Pipe`] and handed
//! to its [`ChildHandler`] on every (re)spawn; a child that exits non-zero or
//! dies by signal is restarted after a fixed backoff, a clean exit is not.
//!
//! On stop every child is signalled with SIGTERM; after the grace period the
//! stragglers are SIGKILLed, and that fact is remembered so the host can exit
//! non-zero.

mod spec;
mod supervisor;

#[cfg(test)]
mod supervisor_test;

pub use spec::{ChildHandler, ChildSpec, RestartPolicy};
pub use supervisor::Supervisor;

use std::time::Duration;

/// Default delay before restarting a crashed child
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(3);

/// Default time to wait between SIGTERM and SIGKILL at stop
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
