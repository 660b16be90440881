//! Record filter - static field injection and removal
//!
//! Adds configured fields to every matching event's record and strips
//! unwanted keys. Events are immutable; the filter re-emits modified copies.
//!
//! ```toml
//! [[filter]]
//! type = "record"
//! match = "app\\..*"
//! add = { team = "platform", dc = "eu-1" }
//! remove = ["password"]
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use sluice_plugin::{parse_config, FilterPlugin, Result};
use sluice_protocol::{Event, Value};

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Fields set on every matching event (existing keys are overwritten)
    pub add: BTreeMap<String, serde_json::Value>,

    /// Keys stripped from every matching event
    pub remove: Vec<String>,
}

/// Field add/remove filter.
#[derive(Default)]
pub struct RecordFilter {
    add: Vec<(String, Value)>,
    remove: Vec<String>,
}

#[async_trait]
impl FilterPlugin for RecordFilter {
    async fn init(&mut self, config: &str) -> Result<()> {
        let config: RecordConfig = parse_config(config)?;
        self.add = config
            .add
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        self.remove = config.remove;
        Ok(())
    }

    async fn filter(&mut self, event: Event) -> Result<Vec<Event>> {
        if self.add.is_empty() && self.remove.is_empty() {
            return Ok(vec![event]);
        }
        let mut record = event.record.clone();
        for key in &self.remove {
            record.remove(key);
        }
        for (key, value) in &self.add {
            record.insert(key.clone(), value.clone());
        }
        Ok(vec![event.with_record(record)])
    }
}
