//! Core types and errors for the page watcher.
//!
//! Everything reported here is heuristic: "encryption" findings are string
//! shapes that look like ciphertext, keys or scheme names. Nothing is decrypted
//! or verified.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur while collecting.
#[derive(Error, Debug)]
pub enum PagescopeError {
    /// Navigation failure, browser crash or lost DevTools connection.
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// A page facet (text nodes, scripts, source, log) could not be read.
    #[error("Page access error: {0}")]
    PageAccess(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No collection run is active")]
    SessionInactive,
}

impl PagescopeError {
    /// Whether this error ends the current collection run.
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, PagescopeError::Driver(_))
    }
}

pub type Result<T> = std::result::Result<T, PagescopeError>;

/// Seconds since the Unix epoch, as a float.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Rule name to matched strings.
pub type PatternMatches = BTreeMap<String, Vec<String>>;

/// One polling tick's worth of results. Never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub visible_data: VisibleData,
    pub network_data: NetworkData,
    pub encryption_analysis: EncryptionAnalysis,
    pub timestamp: f64,
}

/// Text scraped from the rendered page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleData {
    /// Trimmed, non-empty text of each text-bearing element, in render order.
    pub text_content: Vec<String>,
    /// Decimal numbers mined from `text_content`, duplicates kept.
    pub numeric_data: Vec<String>,
    /// Lines of `text_content` containing a domain keyword.
    pub game_elements: Vec<String>,
    pub timestamps: Vec<f64>,
}

/// Requests and socket frames reconstructed from the network log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkData {
    pub requests: Vec<RequestRecord>,
    /// Subset of `requests` whose URL looks like a data endpoint.
    pub api_calls: Vec<RequestRecord>,
    pub websocket_messages: Vec<FrameRecord>,
}

/// An outbound HTTP request. `timestamp` is capture time, not log time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub timestamp: f64,
}

/// Direction of a websocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDirection {
    Sent,
    Received,
}

/// A websocket frame with its raw DevTools parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub direction: FrameDirection,
    pub payload: serde_json::Value,
    pub timestamp: f64,
}

/// Heuristic encoding/secret findings for a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptionAnalysis {
    pub encryption_indicators: Vec<EncryptionIndicator>,
    pub suspicious_strings: Vec<SuspiciousString>,
    /// Script identifier (`script_<ordinal>`) to per-rule matches.
    pub javascript_analysis: BTreeMap<String, PatternMatches>,
    pub potential_keys: Vec<PotentialKey>,
}

/// Kind of a suspicious string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspiciousKind {
    Base64,
}

/// A page-source substring that decodes as base64 to a meaningful size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousString {
    pub kind: SuspiciousKind,
    /// First 50 characters, with `...` appended when truncated.
    pub encoded: String,
    pub decoded_length: usize,
}

/// Encryption scheme names seen in a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionIndicator {
    pub source: String,
    pub scheme: String,
    pub matches: Vec<String>,
}

/// A credential-shaped assignment value seen in a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialKey {
    pub source: String,
    pub kind: String,
    pub value: String,
}

/// Manual-analysis guidance returned when no live session is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysisGuidance {
    pub status: String,
    pub message: String,
    pub target_url: String,
    pub recommended_steps: Vec<String>,
}

/// Result of an on-demand analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeOutcome {
    Live(EncryptionAnalysis),
    Guidance(DeepAnalysisGuidance),
}

/// One-off live inspection of a page: analysis plus optional extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub target_url: String,
    pub analysis: EncryptionAnalysis,
    /// Text of the elements matching the requested CSS selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_text: Option<Vec<String>>,
    /// Base64-encoded PNG of the viewport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_failure_classification() {
        assert!(PagescopeError::Driver("gone".into()).is_driver_failure());
        assert!(!PagescopeError::PageAccess("bad json".into()).is_driver_failure());
    }

    #[test]
    fn test_snapshot_serializes_field_for_field() {
        let snapshot = Snapshot {
            timestamp: 1.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("visible_data").is_some());
        assert!(json.get("network_data").is_some());
        assert!(json.get("encryption_analysis").is_some());
        assert_eq!(json["timestamp"], 1.5);
    }

    #[test]
    fn test_suspicious_kind_serializes_lowercase() {
        let s = SuspiciousString {
            kind: SuspiciousKind::Base64,
            encoded: "abc".into(),
            decoded_length: 6,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["kind"], "base64");
    }

    #[test]
    fn test_page_report_omits_missing_extras() {
        let report = PageReport {
            target_url: "https://example.com".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("analysis").is_some());
        assert!(json.get("selector_text").is_none());
        assert!(json.get("screenshot").is_none());
    }

    #[test]
    fn test_unix_timestamp_is_positive() {
        assert!(unix_timestamp() > 0.0);
    }
}
