use sluice_plugin::OutputPlugin;
use sluice_protocol::{Event, Record, Value};

use super::FileOutput;

fn event(tag: &str, n: i64) -> Event {
    let mut record = Record::new();
    record.insert("n".into(), Value::Int(n));
    Event::new(tag, record)
}

#[tokio::test]
async fn init_requires_a_path() {
    let mut out = FileOutput::default();
    assert!(out.init("{}").await.is_err());
}

#[tokio::test]
async fn writes_json_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");

    let mut out = FileOutput::default();
    out.init(&format!(r#"{{"path": "{}"}}"#, path.display()))
        .await
        .unwrap();
    out.start().await.unwrap();

    let items: Vec<_> = (0..3)
        .map(|n| out.encode(&event("file.test", n)).unwrap())
        .collect();
    out.write(&items).await.unwrap();
    out.stop().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    for (n, line) in lines.iter().enumerate() {
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["tag"], "file.test");
        assert_eq!(parsed["record"]["n"], n as i64);
        assert!(parsed["time"].as_str().unwrap().ends_with('Z'));
    }
}

#[tokio::test]
async fn write_before_start_reports_no_progress() {
    let mut out = FileOutput::default();
    out.init(r#"{"path": "/tmp/never-opened.log"}"#).await.unwrap();

    let item = out.encode(&event("x", 0)).unwrap();
    let err = out.write(&[item]).await.unwrap_err();
    assert_eq!(err.committed, 0);
}

#[tokio::test]
async fn appends_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let config = format!(r#"{{"path": "{}"}}"#, path.display());

    for n in 0..2 {
        let mut out = FileOutput::default();
        out.init(&config).await.unwrap();
        out.start().await.unwrap();
        let item = out.encode(&event("restart", n)).unwrap();
        out.write(&[item]).await.unwrap();
        out.stop().await.unwrap();
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
}
