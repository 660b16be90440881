use sluice_plugin::FilterPlugin;
use sluice_protocol::{Event, Record, Value};

use super::RecordFilter;

fn event() -> Event {
    let mut record = Record::new();
    record.insert("message".into(), Value::Str("hello".into()));
    record.insert("password".into(), Value::Str("hunter2".into()));
    Event::new("app.web", record)
}

#[tokio::test]
async fn adds_and_removes_fields() {
    let mut filter = RecordFilter::default();
    filter
        .init(r#"{"add": {"team": "platform", "n": 4}, "remove": ["password"]}"#)
        .await
        .unwrap();

    let out = filter.filter(event()).await.unwrap();
    assert_eq!(out.len(), 1);
    let ev = &out[0];
    assert_eq!(ev.tag, "app.web");
    assert_eq!(ev.get("team"), Some(&Value::Str("platform".into())));
    assert_eq!(ev.get("n"), Some(&Value::Int(4)));
    assert_eq!(ev.get("message"), Some(&Value::Str("hello".into())));
    assert_eq!(ev.get("password"), None);
}

#[tokio::test]
async fn add_overwrites_existing_keys() {
    let mut filter = RecordFilter::default();
    filter
        .init(r#"{"add": {"message": "replaced"}}"#)
        .await
        .unwrap();

    let out = filter.filter(event()).await.unwrap();
    assert_eq!(out[0].get("message"), Some(&Value::Str("replaced".into())));
}

#[tokio::test]
async fn empty_config_passes_events_through() {
    let mut filter = RecordFilter::default();
    filter.init("").await.unwrap();

    let input = event();
    let out = filter.filter(input.clone()).await.unwrap();
    assert_eq!(out, vec![input]);
}

#[tokio::test]
async fn original_event_time_and_tag_are_preserved() {
    let mut filter = RecordFilter::default();
    filter.init(r#"{"add": {"x": true}}"#).await.unwrap();

    let input = event();
    let out = filter.filter(input.clone()).await.unwrap();
    assert_eq!(out[0].tag, input.tag);
    assert_eq!(out[0].time, input.time);
}
