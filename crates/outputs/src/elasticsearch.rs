//! Elasticsearch output - bulk API sink
//!
//! Encodes each event as an `index` action plus document pair and ships
//! whole chunks through `POST /_bulk`. Supports logstash-style daily index
//! naming and tag injection into the document.

use async_trait::async_trait;
use serde::Deserialize;

use sluice_buffer::{BytesItem, WriteError};
use sluice_plugin::{parse_config, OutputPlugin, Result};
use sluice_protocol::{Event, Value};

#[cfg(test)]
#[path = "elasticsearch_test.rs"]
mod elasticsearch_test;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster
    pub url: String,

    /// Index name when logstash naming is off
    pub index: String,

    /// Use `<prefix>-YYYY.MM.DD` daily indices and stamp `@timestamp`
    pub logstash_format: bool,

    /// Prefix for logstash-style index names
    pub logstash_prefix: String,

    /// Record key that receives the event tag
    pub tag_key: Option<String>,

    /// Record key whose string value becomes the document id
    pub id_key: Option<String>,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            index: "sluice".to_string(),
            logstash_format: false,
            logstash_prefix: "logstash".to_string(),
            tag_key: None,
            id_key: None,
        }
    }
}

/// Bulk-API Elasticsearch sink.
#[derive(Default)]
pub struct ElasticsearchOutput {
    config: ElasticsearchConfig,
    client: Option<reqwest::Client>,
}

#[async_trait]
impl OutputPlugin for ElasticsearchOutput {
    async fn init(&mut self, config: &str) -> Result<()> {
        self.config = parse_config(config)?;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.client = Some(reqwest::Client::new());
        Ok(())
    }

    fn encode(&mut self, event: &Event) -> Result<BytesItem> {
        let index = if self.config.logstash_format {
            format!(
                "{}-{}",
                self.config.logstash_prefix,
                event.time.format("%Y.%m.%d")
            )
        } else {
            self.config.index.clone()
        };

        let mut doc = match serde_json::to_value(Value::Map(event.record.clone()))? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if self.config.logstash_format && !doc.contains_key("@timestamp") {
            doc.insert(
                "@timestamp".to_string(),
                serde_json::Value::String(event.time.to_rfc3339()),
            );
        }
        if let Some(tag_key) = &self.config.tag_key {
            doc.insert(
                tag_key.clone(),
                serde_json::Value::String(event.tag.clone()),
            );
        }

        let mut action = serde_json::Map::new();
        action.insert(
            "_index".to_string(),
            serde_json::Value::String(index),
        );
        if let Some(id_key) = &self.config.id_key {
            if let Some(id) = event.get(id_key).and_then(Value::as_str) {
                action.insert(
                    "_id".to_string(),
                    serde_json::Value::String(id.to_string()),
                );
            }
        }

        let mut bytes = serde_json::to_vec(&serde_json::json!({ "index": action }))?;
        bytes.push(b'\n');
        bytes.extend(serde_json::to_vec(&serde_json::Value::Object(doc))?);
        bytes.push(b'\n');
        Ok(BytesItem::from(bytes))
    }

    async fn write(&mut self, items: &[BytesItem]) -> std::result::Result<(), WriteError> {
        let Some(client) = self.client.as_ref() else {
            return Err(WriteError::total("elasticsearch output is not started"));
        };
        let mut body = Vec::with_capacity(items.iter().map(|i| i.as_slice().len()).sum());
        for item in items {
            body.extend_from_slice(item.as_slice());
        }

        let url = format!("{}/_bulk", self.config.url.trim_end_matches('/'));
        let response = client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| WriteError::total(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WriteError::total(format!("bulk request failed: {status}, {detail}")));
        }
        Ok(())
    }
}
