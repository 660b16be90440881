use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use sluice_transport::Pipe;

use crate::{ChildHandler, ChildSpec, RestartPolicy, Supervisor};

#[derive(Default)]
struct CountingHandler {
    attached: AtomicUsize,
    crashed: AtomicUsize,
}

#[async_trait]
impl ChildHandler for CountingHandler {
    async fn attached(&self, _pipe: Pipe) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn crashed(&self, _detail: &str) {
        self.crashed.fetch_add(1, Ordering::SeqCst);
    }
}

fn sh(script: &'static str) -> impl Fn() -> Command + Send + Sync + 'static {
    move || {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }
}

#[tokio::test]
async fn crashing_child_is_restarted_after_backoff() {
    let handler = Arc::new(CountingHandler::default());
    let supervisor = Supervisor::with_grace(Duration::from_millis(200));
    supervisor.add(
        ChildSpec::new("crasher", sh("exit 1"), handler.clone()).with_policy(
            RestartPolicy::RestartOnError {
                backoff: Duration::from_millis(30),
            },
        ),
    );
    supervisor.start();

    let deadline = Instant::now() + Duration::from_secs(5);
    while handler.crashed.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(
        handler.crashed.load(Ordering::SeqCst) >= 2,
        "expected at least two crash reports"
    );
    assert!(handler.attached.load(Ordering::SeqCst) >= 2);

    supervisor.stop().await;
}

#[tokio::test]
async fn clean_exit_is_not_restarted() {
    let handler = Arc::new(CountingHandler::default());
    let supervisor = Supervisor::new();
    supervisor.add(
        ChildSpec::new("oneshot", sh("exit 0"), handler.clone()).with_policy(
            RestartPolicy::RestartOnError {
                backoff: Duration::from_millis(10),
            },
        ),
    );
    supervisor.start();
    supervisor.wait().await;

    assert_eq!(handler.attached.load(Ordering::SeqCst), 1);
    assert_eq!(handler.crashed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn never_policy_gives_up_after_one_crash() {
    let handler = Arc::new(CountingHandler::default());
    let supervisor = Supervisor::new();
    supervisor.add(
        ChildSpec::new("fragile", sh("exit 7"), handler.clone())
            .with_policy(RestartPolicy::Never),
    );
    supervisor.start();
    supervisor.wait().await;

    assert_eq!(handler.crashed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_terminates_a_long_running_child() {
    let handler = Arc::new(CountingHandler::default());
    let supervisor = Supervisor::with_grace(Duration::from_secs(2));
    supervisor.add(ChildSpec::new("sleeper", sh("sleep 30"), handler.clone()));
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    supervisor.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "stop must not wait for the child's natural exit"
    );
    assert!(!supervisor.forced_kill(), "sh exits on SIGTERM");
}

#[tokio::test]
async fn stubborn_child_is_force_killed() {
    let handler = Arc::new(CountingHandler::default());
    let supervisor = Supervisor::with_grace(Duration::from_millis(200));
    supervisor.add(ChildSpec::new(
        "stubborn",
        sh("trap '' TERM; while true; do sleep 1; done"),
        handler.clone(),
    ));
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(200)).await;

    supervisor.stop().await;
    assert!(supervisor.forced_kill());
}
