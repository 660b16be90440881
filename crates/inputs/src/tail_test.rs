use std::io::Write;

use super::{LineFormat, TailConfig, Tailer};
use sluice_protocol::Value;

fn config(dir: &tempfile::TempDir, read_from_head: bool, pos: bool) -> TailConfig {
    TailConfig {
        tag: "tail.test".into(),
        path: dir.path().join("app.log").display().to_string(),
        pos_file: pos.then(|| dir.path().join("pos").display().to_string()),
        format: LineFormat::Raw,
        read_from_head,
        ..Default::default()
    }
}

fn append(path: &str, data: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

#[tokio::test]
async fn reads_appended_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, true, false);
    let mut tailer = Tailer::new(cfg.clone()).unwrap();

    append(&cfg.path, "one\ntwo\n");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tag, "tail.test");
    assert_eq!(events[0].get("message"), Some(&Value::Str("one".into())));
    assert_eq!(events[1].get("message"), Some(&Value::Str("two".into())));

    append(&cfg.path, "three\n");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("message"), Some(&Value::Str("three".into())));
}

#[tokio::test]
async fn partial_lines_wait_for_completion() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, true, false);
    let mut tailer = Tailer::new(cfg.clone()).unwrap();

    append(&cfg.path, "complete\nhalf");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 1);

    append(&cfg.path, "-done\n");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get("message"),
        Some(&Value::Str("half-done".into()))
    );
}

#[tokio::test]
async fn starts_at_the_end_without_read_from_head() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, false, false);
    append(&cfg.path, "old content\n");

    let mut tailer = Tailer::new(cfg.clone()).unwrap();
    let events = tailer.scan().await.unwrap();
    assert!(events.is_empty(), "pre-existing content must be skipped");

    append(&cfg.path, "new line\n");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get("message"),
        Some(&Value::Str("new line".into()))
    );
}

#[tokio::test]
async fn json_lines_become_structured_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir, true, false);
    cfg.format = LineFormat::Json;
    let mut tailer = Tailer::new(cfg.clone()).unwrap();

    append(&cfg.path, "{\"level\":\"info\",\"n\":3}\nnot json\n");
    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].get("level"), Some(&Value::Str("info".into())));
    assert_eq!(events[0].get("n"), Some(&Value::Int(3)));
    // Non-object lines degrade to the raw shape.
    assert_eq!(
        events[1].get("message"),
        Some(&Value::Str("not json".into()))
    );
}

#[tokio::test]
async fn rotation_restarts_from_the_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, true, false);
    let mut tailer = Tailer::new(cfg.clone()).unwrap();

    append(&cfg.path, "before\n");
    assert_eq!(tailer.scan().await.unwrap().len(), 1);

    // Rotate: move the file aside, start a fresh one at the same path.
    std::fs::rename(&cfg.path, dir.path().join("app.log.1")).unwrap();
    append(&cfg.path, "after\n");

    let events = tailer.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("message"), Some(&Value::Str("after".into())));
}

#[tokio::test]
async fn position_file_prevents_double_reads_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, true, true);

    append(&cfg.path, "first\nsecond\n");
    let mut tailer = Tailer::new(cfg.clone()).unwrap();
    assert_eq!(tailer.scan().await.unwrap().len(), 2);
    drop(tailer);

    // A new tailer with the same position file resumes where we left off.
    let mut restarted = Tailer::new(cfg.clone()).unwrap();
    assert!(restarted.scan().await.unwrap().is_empty());

    append(&cfg.path, "third\n");
    let events = restarted.scan().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("message"), Some(&Value::Str("third".into())));
}
