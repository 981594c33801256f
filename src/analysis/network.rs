//! Reconstruct requests and websocket frames from a DevTools network log.
//!
//! Each log entry carries a JSON message shaped like a Chrome performance log
//! record: `{"message": {"method": "Network.requestWillBeSent", "params": {...}}}`.

use crate::driver::{LogEntry, PageState};
use crate::types::{unix_timestamp, FrameDirection, FrameRecord, NetworkData, RequestRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Only this many of the most recent log entries are examined.
pub const NETWORK_WINDOW: usize = 50;

pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
pub const WEBSOCKET_FRAME_SENT: &str = "Network.webSocketFrameSent";
pub const WEBSOCKET_FRAME_RECEIVED: &str = "Network.webSocketFrameReceived";

/// URL substrings that mark a request as API-like.
const API_INDICATORS: &[&str] = &["api", "json", "data", "ws", "socket"];

/// Turns the tail of a network log into request and frame records.
#[derive(Debug, Clone)]
pub struct NetworkObserver {
    window: usize,
}

impl NetworkObserver {
    pub fn new() -> Self {
        Self {
            window: NETWORK_WINDOW,
        }
    }

    /// Capture from the page's network log. A missing log yields empty data.
    pub fn observe(&self, page: &PageState) -> NetworkData {
        match page.network_log.as_deref() {
            Some(entries) => self.capture(entries),
            None => {
                warn!("Network log unavailable, returning empty network data");
                NetworkData::default()
            }
        }
    }

    /// Capture from the most recent entries of `entries`. Malformed entries are skipped.
    pub fn capture(&self, entries: &[LogEntry]) -> NetworkData {
        let mut data = NetworkData::default();
        let start = entries.len().saturating_sub(self.window);

        for entry in &entries[start..] {
            let Some((method, params)) = decode_entry(entry) else {
                trace!("Skipping undecodable log entry");
                continue;
            };

            match method.as_str() {
                REQUEST_WILL_BE_SENT => {
                    let record = request_record(&params);
                    if is_api_like(&record.url) {
                        data.api_calls.push(record.clone());
                    }
                    data.requests.push(record);
                }
                WEBSOCKET_FRAME_SENT => {
                    data.websocket_messages
                        .push(frame_record(FrameDirection::Sent, params));
                }
                WEBSOCKET_FRAME_RECEIVED => {
                    data.websocket_messages
                        .push(frame_record(FrameDirection::Received, params));
                }
                _ => {}
            }
        }

        debug!(
            "Captured {} requests ({} API-like), {} websocket frames",
            data.requests.len(),
            data.api_calls.len(),
            data.websocket_messages.len()
        );
        data
    }
}

impl Default for NetworkObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a URL looks like a data/API endpoint.
pub fn is_api_like(url: &str) -> bool {
    let lower = url.to_lowercase();
    API_INDICATORS.iter().any(|token| lower.contains(token))
}

fn decode_entry(entry: &LogEntry) -> Option<(String, Value)> {
    let value: Value = serde_json::from_str(&entry.message).ok()?;
    let message = value.get("message")?;
    let method = message.get("method")?.as_str()?.to_string();
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    Some((method, params))
}

fn request_record(params: &Value) -> RequestRecord {
    let request = params.get("request");
    let field = |name: &str| {
        request
            .and_then(|r| r.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let headers = request
        .and_then(|r| r.get("headers"))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_else(BTreeMap::new);

    RequestRecord {
        url: field("url"),
        method: field("method"),
        headers,
        timestamp: unix_timestamp(),
    }
}

fn frame_record(direction: FrameDirection, params: Value) -> FrameRecord {
    FrameRecord {
        direction,
        payload: params,
        timestamp: unix_timestamp(),
    }
}
