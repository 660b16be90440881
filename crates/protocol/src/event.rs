//! Event - the unit of data flow

use chrono::{DateTime, Utc};

use crate::value::{Record, Value};

/// A tagged, timestamped, structured record.
///
/// Events are immutable once emitted; filters build new events rather than
/// mutating the ones they receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Dot-separated hierarchical routing label
    pub tag: String,

    /// When the event happened (not when it was observed)
    pub time: DateTime<Utc>,

    /// The structured payload
    pub record: Record,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(tag: impl Into<String>, record: Record) -> Self {
        Self {
            tag: tag.into(),
            time: Utc::now(),
            record,
        }
    }

    /// Create an event with an explicit timestamp.
    pub fn with_time(tag: impl Into<String>, time: DateTime<Utc>, record: Record) -> Self {
        Self {
            tag: tag.into(),
            time,
            record,
        }
    }

    /// Derive a new event with the same tag and time but a different record.
    pub fn with_record(&self, record: Record) -> Self {
        Self {
            tag: self.tag.clone(),
            time: self.time,
            record,
        }
    }

    /// Record field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }
}
