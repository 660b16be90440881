//! Child process supervision loops

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sluice_transport::Pipe;

use crate::spec::{ChildSpec, RestartPolicy};
use crate::DEFAULT_STOP_GRACE;

/// Supervises external plugin processes.
pub struct Supervisor {
    pending: Mutex<Vec<ChildSpec>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    grace: Duration,
    forced: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_STOP_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            grace,
            forced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a child. Takes effect at [`Supervisor::start`].
    pub fn add(&self, spec: ChildSpec) {
        self.pending.lock().push(spec);
    }

    /// Launch one supervision task per registered child.
    pub fn start(&self) {
        let specs: Vec<ChildSpec> = self.pending.lock().drain(..).collect();
        let mut tasks = self.tasks.lock();
        for spec in specs {
            let cancel = self.cancel.clone();
            let grace = self.grace;
            let forced = Arc::clone(&self.forced);
            tasks.push(tokio::spawn(run_child(spec, cancel, grace, forced)));
        }
    }

    /// Signal every child to terminate and wait for the supervision tasks.
    ///
    /// Children get SIGTERM, then SIGKILL after the grace period. Safe to
    /// call more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.wait().await;
    }

    /// Wait for all supervision tasks to finish.
    pub async fn wait(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// True if any child had to be SIGKILLed during stop.
    pub fn forced_kill(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_child(
    spec: ChildSpec,
    cancel: CancellationToken,
    grace: Duration,
    forced: Arc<AtomicBool>,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut cmd = (spec.command)();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                spec.handler.crashed(&format!("spawn failed: {e}"));
                if !backoff_or_cancel(&spec, &cancel).await {
                    return;
                }
                continue;
            }
        };

        tracing::info!(child = %spec.name, pid = child.id(), "child started");

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                spec.handler.attached(Pipe::new(stdout, stdin)).await;
            }
            _ => {
                spec.handler.crashed("child is missing piped stdio");
            }
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => {
                    tracing::info!(child = %spec.name, "child exited cleanly");
                    return;
                }
                Ok(status) => {
                    spec.handler.crashed(&format!("child exited: {status}"));
                    if !backoff_or_cancel(&spec, &cancel).await {
                        return;
                    }
                }
                Err(e) => {
                    spec.handler.crashed(&format!("wait failed: {e}"));
                    return;
                }
            },
            _ = cancel.cancelled() => {
                terminate(&spec.name, &mut child, grace, &forced).await;
                return;
            }
        }
    }
}

/// Sleep out the restart backoff. Returns false when the child must not be
/// respawned (policy says never, or the supervisor is stopping).
async fn backoff_or_cancel(spec: &ChildSpec, cancel: &CancellationToken) -> bool {
    let backoff = match spec.policy {
        RestartPolicy::Never => return false,
        RestartPolicy::RestartOnError { backoff } => backoff,
    };
    tracing::info!(child = %spec.name, backoff = ?backoff, "restarting after backoff");
    tokio::select! {
        _ = tokio::time::sleep(backoff) => true,
        _ = cancel.cancelled() => false,
    }
}

/// SIGTERM the child, give it the grace period, then SIGKILL.
async fn terminate(name: &str, child: &mut Child, grace: Duration, forced: &AtomicBool) {
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {
            tracing::info!(child = %name, "child stopped");
        }
        Err(_) => {
            tracing::warn!(child = %name, grace = ?grace, "grace period expired, killing child");
            forced.store(true, Ordering::Release);
            let _ = child.kill().await;
        }
    }
}
