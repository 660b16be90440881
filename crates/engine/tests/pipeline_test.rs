//! End-to-end pipeline tests over embedded plugins
//!
//! These drive a real engine: registration, start, event flow through the
//! filter chain and named output routers, and phased shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sluice_buffer::{BufferOptions, BytesItem, WriteError};
use sluice_engine::{Engine, EngineError, UnitConfig};
use sluice_plugin::{
    parse_config, Emitter, FilterPlugin, InputPlugin, OutputPlugin, PluginFactory, PluginRegistry,
};
use sluice_protocol::{Event, Record, Value};

// =============================================================================
// Test plugins
// =============================================================================

/// Input that forwards events pushed through a channel by the test.
struct ProbeInput {
    ctx: Option<Emitter>,
    feed: Arc<Mutex<Option<mpsc::UnboundedReceiver<Event>>>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl InputPlugin for ProbeInput {
    async fn init(&mut self, ctx: Emitter, _config: &str) -> sluice_plugin::Result<()> {
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> sluice_plugin::Result<()> {
        let Some(ctx) = self.ctx.clone() else {
            return Ok(());
        };
        let Some(mut feed) = self.feed.lock().take() else {
            return Ok(());
        };
        self.task = Some(tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                let _ = ctx.emit(event).await;
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> sluice_plugin::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

/// Filter that appends its configured name to the record's `hops` array.
#[derive(Default)]
struct StampFilter {
    name: String,
}

#[derive(serde::Deserialize)]
struct StampConfig {
    name: String,
}

#[async_trait]
impl FilterPlugin for StampFilter {
    async fn init(&mut self, config: &str) -> sluice_plugin::Result<()> {
        let config: StampConfig = parse_config(config)?;
        self.name = config.name;
        Ok(())
    }

    async fn filter(&mut self, event: Event) -> sluice_plugin::Result<Vec<Event>> {
        let mut record = event.record.clone();
        let mut hops = match record.remove("hops") {
            Some(Value::Array(hops)) => hops,
            _ => Vec::new(),
        };
        hops.push(Value::Str(self.name.clone()));
        record.insert("hops".into(), Value::Array(hops));
        Ok(vec![event.with_record(record)])
    }
}

/// Output that records `label|tag|hops` lines into a shared vec.
#[derive(Clone, Default)]
struct CaptureOutput {
    label: String,
    sink: Arc<Mutex<Vec<String>>>,
}

#[derive(serde::Deserialize)]
struct CaptureConfig {
    #[serde(default)]
    label: String,
}

#[async_trait]
impl OutputPlugin for CaptureOutput {
    async fn init(&mut self, config: &str) -> sluice_plugin::Result<()> {
        let config: CaptureConfig = parse_config(config)?;
        self.label = config.label;
        Ok(())
    }

    fn encode(&mut self, event: &Event) -> sluice_plugin::Result<BytesItem> {
        let hops = match event.get("hops") {
            Some(Value::Array(hops)) => hops
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
            _ => String::new(),
        };
        Ok(BytesItem::from(
            format!("{}|{}|{}", self.label, event.tag, hops).as_str(),
        ))
    }

    async fn write(&mut self, items: &[BytesItem]) -> Result<(), WriteError> {
        let mut sink = self.sink.lock();
        for item in items {
            sink.push(String::from_utf8_lossy(item.as_slice()).into_owned());
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    engine: Engine,
    captured: Arc<Mutex<Vec<String>>>,
    feed: mpsc::UnboundedSender<Event>,
}

fn build_harness() -> Harness {
    let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let feed_slot = Arc::new(Mutex::new(Some(feed_rx)));

    let mut registry = PluginRegistry::new();
    let slot = Arc::clone(&feed_slot);
    registry.register(
        "in-probe",
        PluginFactory::input(move || {
            Box::new(ProbeInput {
                ctx: None,
                feed: Arc::clone(&slot),
                task: None,
            })
        }),
    );
    registry.register(
        "filter-stamp",
        PluginFactory::filter(|| Box::new(StampFilter::default())),
    );
    let sink = Arc::clone(&captured);
    registry.register(
        "out-capture",
        PluginFactory::output(move || {
            Box::new(CaptureOutput {
                label: String::new(),
                sink: Arc::clone(&sink),
            })
        }),
    );

    Harness {
        engine: Engine::new(registry),
        captured,
        feed: feed_tx,
    }
}

fn fast_buffer(engine: &Engine) {
    engine.register_buffer(BufferOptions {
        name: "fast".into(),
        max_chunk_size: 64 * 1024,
        max_queue_size: 16,
        flush_interval: Duration::from_millis(20),
    });
}

fn event(tag: &str) -> Event {
    let mut record = Record::new();
    record.insert("k".into(), Value::Str("v".into()));
    Event::new(tag, record)
}

async fn wait_for(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !check() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check(), "condition not met within deadline");
}

fn capture_config(label: &str) -> serde_json::Value {
    serde_json::json!({ "label": label })
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn flat_ingest_reaches_a_single_output() {
    let h = build_harness();
    fast_buffer(&h.engine);
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("fast")
                .with_options(capture_config("main")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    h.engine.emit(event("svc.web")).await;

    let captured = Arc::clone(&h.captured);
    wait_for(move || captured.lock().iter().any(|l| l == "main|svc.web|")).await;

    h.engine.stop().await;
}

#[tokio::test]
async fn filter_chain_runs_in_registration_order_without_loops() {
    let h = build_harness();
    fast_buffer(&h.engine);
    h.engine
        .register_filter(
            UnitConfig::new("stamp")
                .with_match(r"app\..*")
                .with_options(serde_json::json!({ "name": "a" })),
        )
        .unwrap();
    h.engine
        .register_filter(
            UnitConfig::new("stamp")
                .with_match(r"app\.auth")
                .with_options(serde_json::json!({ "name": "b" })),
        )
        .unwrap();
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("fast")
                .with_options(capture_config("out")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    // Matches both filters: A first, then B, then the output. Never A twice.
    h.engine.emit(event("app.auth")).await;
    // Matches only A.
    h.engine.emit(event("app.web")).await;

    let captured = Arc::clone(&h.captured);
    wait_for(move || captured.lock().len() >= 2).await;

    let captured = h.captured.lock().clone();
    assert!(captured.contains(&"out|app.auth|a,b".to_string()), "{captured:?}");
    assert!(captured.contains(&"out|app.web|a".to_string()), "{captured:?}");
    assert_eq!(captured.len(), 2, "no event may traverse a filter twice");

    h.engine.stop().await;
}

#[tokio::test]
async fn event_fans_out_to_every_named_router_once() {
    let h = build_harness();
    fast_buffer(&h.engine);
    h.engine
        .register_output(
            "archive",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("fast")
                .with_options(capture_config("archive")),
        )
        .unwrap();
    h.engine
        .register_output(
            "search",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("fast")
                .with_options(capture_config("search")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    h.engine.emit(event("svc.db")).await;

    let captured = Arc::clone(&h.captured);
    wait_for(move || captured.lock().len() >= 2).await;

    let captured = h.captured.lock().clone();
    assert!(captured.contains(&"archive|svc.db|".to_string()));
    assert!(captured.contains(&"search|svc.db|".to_string()));
    assert_eq!(captured.len(), 2);

    h.engine.stop().await;
}

#[tokio::test]
async fn first_match_wins_within_one_router() {
    let h = build_harness();
    fast_buffer(&h.engine);
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(r"app\..*")
                .with_buffer("fast")
                .with_options(capture_config("first")),
        )
        .unwrap();
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("fast")
                .with_options(capture_config("second")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    h.engine.emit(event("app.x")).await;
    h.engine.emit(event("db.y")).await;

    let captured = Arc::clone(&h.captured);
    wait_for(move || captured.lock().len() >= 2).await;

    let captured = h.captured.lock().clone();
    assert!(captured.contains(&"first|app.x|".to_string()));
    assert!(captured.contains(&"second|db.y|".to_string()));
    assert_eq!(captured.len(), 2);

    h.engine.stop().await;
}

#[tokio::test]
async fn graceful_stop_drains_and_silences_inputs() {
    let h = build_harness();
    // Flushing only happens through the stop-path drain.
    h.engine.register_buffer(BufferOptions {
        name: "slow".into(),
        max_chunk_size: 64 * 1024,
        max_queue_size: 16,
        flush_interval: Duration::from_secs(3600),
    });
    h.engine.register_input(UnitConfig::new("probe")).unwrap();
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(".*")
                .with_buffer("slow")
                .with_options(capture_config("out")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    for n in 0..3 {
        h.feed.send(event(&format!("stop.test.{n}"))).unwrap();
    }
    // Let the events travel input -> engine -> output buffer.
    tokio::time::sleep(Duration::from_millis(200)).await;

    h.engine.stop().await;

    // The final chunk was handed to the handler during shutdown.
    let drained = h.captured.lock().len();
    assert_eq!(drained, 3, "{:?}", h.captured.lock());

    // Nothing emitted after stop is observed at the output.
    let _ = h.feed.send(event("stop.test.late"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.captured.lock().len(), drained);
}

#[tokio::test]
async fn unmatched_events_are_counted_as_dropped() {
    let h = build_harness();
    fast_buffer(&h.engine);
    h.engine
        .register_output(
            "default",
            UnitConfig::new("capture")
                .with_match(r"^only\.this")
                .with_buffer("fast")
                .with_options(capture_config("out")),
        )
        .unwrap();
    h.engine.start().await.unwrap();

    h.engine.emit(event("something.else")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = h.engine.metrics_snapshot();
    assert_eq!(snapshot.events_dropped, 1);
    assert!(h.captured.lock().is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn registration_errors_are_configuration_errors() {
    let h = build_harness();

    let err = h
        .engine
        .register_output(
            "default",
            UnitConfig::new("capture").with_match(".*").with_buffer("missing"),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownBuffer(name) if name == "missing"));

    let err = h
        .engine
        .register_output("default", UnitConfig::new("capture").with_match("*["))
        .unwrap_err();
    assert!(matches!(err, EngineError::Routing(_)));

    let err = h
        .engine
        .register_filter(UnitConfig::new("stamp"))
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingMatch(_)));

    let err = h.engine.register_input(UnitConfig::new("nope")).unwrap_err();
    assert!(matches!(err, EngineError::UnknownPlugin(_)));
}
