use std::time::Duration;

use chrono::{TimeZone, Utc};
use sluice_protocol::{Event, Message, Record, Value};
use tokio::time::timeout;

use crate::{Pipe, TransportError};

fn sample_event(n: i64) -> Event {
    let mut record = Record::new();
    record.insert("seq".into(), Value::Int(n));
    Event::with_time(
        "test.pipe",
        Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
        record,
    )
}

#[tokio::test]
async fn in_process_pipe_delivers_frames_both_ways() {
    let (host, plugin) = Pipe::in_process();
    let (mut host_rx, mut host_tx) = host.split();
    let (mut plugin_rx, mut plugin_tx) = plugin.split();

    host_tx.send(&Message::info_request()).await.unwrap();
    let received = plugin_rx.recv().await.unwrap();
    assert_eq!(received, Message::info_request());

    plugin_tx.send(&Message::info_response(1)).await.unwrap();
    let received = host_rx.recv().await.unwrap();
    assert_eq!(received, Message::info_response(1));
}

#[tokio::test]
async fn frames_survive_interleaving_and_order() {
    let (host, plugin) = Pipe::in_process();
    let (_host_rx, mut host_tx) = host.split();
    let (mut plugin_rx, _plugin_tx) = plugin.split();

    for n in 0..20 {
        host_tx.send(&Message::event(7, sample_event(n))).await.unwrap();
    }

    for n in 0..20 {
        let msg = plugin_rx.recv().await.unwrap();
        assert_eq!(msg, Message::event(7, sample_event(n)));
    }
}

#[tokio::test]
async fn recv_waits_for_a_complete_frame() {
    let (client, server) = tokio::io::duplex(1024);
    let (_, mut raw_tx) = tokio::io::split(client);
    let (server_read, server_write) = tokio::io::split(server);
    let mut pipe = Pipe::new(server_read, server_write);

    let mut frame = Vec::new();
    sluice_protocol::codec::encode(&Message::event(1, sample_event(0)), &mut frame).unwrap();

    // Dribble the frame one half at a time.
    let (a, b) = frame.split_at(frame.len() / 2);
    use tokio::io::AsyncWriteExt;
    raw_tx.write_all(a).await.unwrap();

    let pending = timeout(Duration::from_millis(50), pipe.reader.recv()).await;
    assert!(pending.is_err(), "half a frame must not decode");

    raw_tx.write_all(b).await.unwrap();
    let msg = timeout(Duration::from_secs(1), pipe.reader.recv())
        .await
        .expect("frame should complete")
        .unwrap();
    assert_eq!(msg, Message::event(1, sample_event(0)));
}

#[tokio::test]
async fn peer_shutdown_surfaces_as_closed() {
    let (host, plugin) = Pipe::in_process();
    let (mut host_rx, _host_tx) = host.split();
    let (_plugin_rx, mut plugin_tx) = plugin.split();

    plugin_tx.shutdown().await.unwrap();
    drop(plugin_tx);

    let err = host_rx.recv().await.unwrap_err();
    assert!(matches!(err, TransportError::Closed));
}

#[tokio::test]
async fn garbage_on_the_wire_is_fatal() {
    let (client, server) = tokio::io::duplex(1024);
    let (_, mut raw_tx) = tokio::io::split(client);
    let (server_read, server_write) = tokio::io::split(server);
    let mut pipe = Pipe::new(server_read, server_write);

    use tokio::io::AsyncWriteExt;
    // A frame whose type value is a string violates the protocol.
    let mut junk = Vec::new();
    rmpv::encode::write_value(&mut junk, &rmpv::Value::String("boom".into())).unwrap();
    rmpv::encode::write_value(&mut junk, &rmpv::Value::Integer(0.into())).unwrap();
    rmpv::encode::write_value(&mut junk, &rmpv::Value::Nil).unwrap();
    raw_tx.write_all(&junk).await.unwrap();

    let err = pipe.reader.recv().await.unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)));
}
