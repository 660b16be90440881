use chrono::{TimeZone, Utc};
use rmpv::Value as Wire;

use super::{entries_from_value, parse_time};
use sluice_protocol::Value;

fn wire_record(pairs: &[(&str, Wire)]) -> Wire {
    Wire::Map(
        pairs
            .iter()
            .map(|(k, v)| (Wire::String((*k).into()), v.clone()))
            .collect(),
    )
}

#[test]
fn flat_encoding_decodes_to_one_event() {
    let value = Wire::Array(vec![
        Wire::String("flat".into()),
        Wire::Integer(1_700_000_000.into()),
        wire_record(&[("key", Wire::String("value".into()))]),
    ]);

    let events = entries_from_value(value).unwrap();
    assert_eq!(events.len(), 1);
    let ev = &events[0];
    assert_eq!(ev.tag, "flat");
    assert_eq!(ev.time, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    assert_eq!(ev.get("key"), Some(&Value::Str("value".into())));
}

#[test]
fn nested_encoding_decodes_to_multiple_events() {
    let t1 = 1_700_000_000i64;

    let mut inner = Vec::new();
    rmpv::encode::write_value(
        &mut inner,
        &Wire::Array(vec![
            Wire::Integer(t1.into()),
            wire_record(&[("seq", Wire::Integer(1.into()))]),
        ]),
    )
    .unwrap();
    rmpv::encode::write_value(
        &mut inner,
        &Wire::Array(vec![
            Wire::Integer((t1 + 1).into()),
            wire_record(&[("seq", Wire::Integer(2.into()))]),
        ]),
    )
    .unwrap();

    let value = Wire::Array(vec![Wire::String("nested".into()), Wire::Binary(inner)]);

    let events = entries_from_value(value).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tag, "nested");
    assert_eq!(events[0].time, Utc.timestamp_opt(t1, 0).unwrap());
    assert_eq!(events[0].get("seq"), Some(&Value::Int(1)));
    assert_eq!(events[1].tag, "nested");
    assert_eq!(events[1].time, Utc.timestamp_opt(t1 + 1, 0).unwrap());
    assert_eq!(events[1].get("seq"), Some(&Value::Int(2)));
}

#[test]
fn entry_array_decodes_under_one_tag() {
    let value = Wire::Array(vec![
        Wire::String("batch".into()),
        Wire::Array(vec![
            Wire::Array(vec![
                Wire::Integer(10.into()),
                wire_record(&[("n", Wire::Integer(1.into()))]),
            ]),
            Wire::Array(vec![
                Wire::Integer(11.into()),
                wire_record(&[("n", Wire::Integer(2.into()))]),
            ]),
        ]),
    ]);

    let events = entries_from_value(value).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.tag == "batch"));
}

#[test]
fn tags_accept_byte_strings() {
    let value = Wire::Array(vec![
        Wire::Binary(b"raw.tag".to_vec()),
        Wire::Integer(5.into()),
        wire_record(&[]),
    ]);

    let events = entries_from_value(value).unwrap();
    assert_eq!(events[0].tag, "raw.tag");
}

#[test]
fn compatible_time_encodings_parse() {
    let epoch = 1_700_000_000i64;
    let expect = Utc.timestamp_opt(epoch, 0).unwrap();

    assert_eq!(parse_time(&Wire::Integer(epoch.into())).unwrap(), expect);
    assert_eq!(
        parse_time(&Wire::Integer(u64::try_from(epoch).unwrap().into())).unwrap(),
        expect
    );
    assert_eq!(parse_time(&Wire::F64(epoch as f64)).unwrap(), expect);

    // EventTime extension: 4-byte seconds + 4-byte nanoseconds, big-endian.
    let mut data = Vec::new();
    data.extend_from_slice(&(epoch as u32).to_be_bytes());
    data.extend_from_slice(&123_456u32.to_be_bytes());
    let parsed = parse_time(&Wire::Ext(0, data)).unwrap();
    assert_eq!(parsed.timestamp(), epoch);
    assert_eq!(parsed.timestamp_subsec_nanos(), 123_456);
}

#[test]
fn malformed_values_are_rejected() {
    assert!(entries_from_value(Wire::String("not an array".into())).is_err());
    assert!(entries_from_value(Wire::Array(vec![Wire::String("t".into())])).is_err());
    assert!(
        entries_from_value(Wire::Array(vec![
            Wire::String("t".into()),
            Wire::Integer(1.into()),
            Wire::String("not a record".into()),
        ]))
        .is_err()
    );
    assert!(parse_time(&Wire::Boolean(true)).is_err());
}
