//! Browser driver contract and the page state read through it.
//!
//! The collector only talks to a [`PageDriver`]; process launch, flags and
//! teardown details live in the implementation (see [`chrome`]).

pub mod chrome;

#[cfg(test)]
pub(crate) mod testing;

pub use chrome::{ChromeDriver, LaunchOptions};

use crate::types::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;

/// An inline or external `<script>` element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptElement {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl ScriptElement {
    /// An inline script with the given body.
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            src: None,
            content: content.into(),
        }
    }
}

/// One network-log record: a JSON message plus the time it was logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub timestamp: f64,
}

impl LogEntry {
    pub fn new(message: String, timestamp: f64) -> Self {
        Self { message, timestamp }
    }
}

/// Operations the collector needs from a live browser session.
///
/// `Driver` errors from any method are tick-fatal; `PageAccess` errors only
/// blank out the affected facet.
pub trait PageDriver: Send + 'static {
    /// Load `url` in the session's page.
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Rendered text of every text-bearing element, in document order, untrimmed.
    ///
    /// Elements that are not rendered (script, style, hidden) contribute an
    /// empty string, never their source text.
    fn text_nodes(&mut self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Current serialized DOM.
    fn page_source(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Network log entries recorded since the previous call.
    fn network_log(&mut self) -> impl Future<Output = Result<Vec<LogEntry>>> + Send;

    /// All `<script>` elements in document order.
    fn scripts(&mut self) -> impl Future<Output = Result<Vec<ScriptElement>>> + Send;

    /// Rendered text of each element matching a CSS selector.
    fn element_texts(
        &mut self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Wait until `selector` matches an element. `PageAccess` on timeout.
    fn wait_for_element(&mut self, selector: &str) -> impl Future<Output = Result<()>> + Send;

    /// PNG capture of the current viewport.
    fn screenshot(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Release the browser. Must be safe to call more than once.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// A frozen view of the page. `None` means the facet could not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageState {
    pub text_nodes: Option<Vec<String>>,
    pub page_source: Option<String>,
    pub scripts: Option<Vec<ScriptElement>>,
    pub network_log: Option<Vec<LogEntry>>,
}

impl PageState {
    /// Read every facet from the driver.
    ///
    /// Facet errors are logged and leave that facet empty; driver failures abort.
    pub async fn read<D: PageDriver>(driver: &mut D) -> Result<Self> {
        Ok(Self {
            text_nodes: facet("text nodes", driver.text_nodes().await)?,
            page_source: facet("page source", driver.page_source().await)?,
            scripts: facet("scripts", driver.scripts().await)?,
            network_log: facet("network log", driver.network_log().await)?,
        })
    }

    /// Read only scripts and page source.
    ///
    /// Leaves the network log untouched, so entries recorded since the last
    /// tick still reach the next snapshot.
    pub async fn read_static<D: PageDriver>(driver: &mut D) -> Result<Self> {
        Ok(Self {
            page_source: facet("page source", driver.page_source().await)?,
            scripts: facet("scripts", driver.scripts().await)?,
            ..Default::default()
        })
    }
}

/// Viewport capture as base64-encoded PNG.
pub async fn screenshot_base64<D: PageDriver>(driver: &mut D) -> Result<String> {
    let png = driver.screenshot().await?;
    Ok(STANDARD.encode(png))
}

fn facet<T>(name: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_driver_failure() => Err(e),
        Err(e) => {
            warn!("Could not read {}: {}", name, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDriver;
    use super::*;
    use crate::types::PagescopeError;

    #[tokio::test]
    async fn test_read_collects_all_facets() {
        let mut driver = FakeDriver::new(PageState {
            text_nodes: Some(vec!["hello".into()]),
            page_source: Some("<p>hello</p>".into()),
            scripts: Some(vec![ScriptElement::inline("1")]),
            network_log: Some(vec![LogEntry::new("{}".into(), 1.0)]),
        });

        let state = PageState::read(&mut driver).await.unwrap();
        assert_eq!(state.text_nodes.unwrap(), vec!["hello".to_string()]);
        assert_eq!(state.page_source.unwrap(), "<p>hello</p>");
        assert_eq!(state.scripts.unwrap().len(), 1);
        assert_eq!(state.network_log.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_facet_is_not_fatal() {
        let mut driver = FakeDriver::new(PageState {
            text_nodes: Some(vec!["hello".into()]),
            ..Default::default()
        });

        let state = PageState::read(&mut driver).await.unwrap();
        assert!(state.text_nodes.is_some());
        assert!(state.page_source.is_none());
        assert!(state.scripts.is_none());
    }

    #[tokio::test]
    async fn test_driver_failure_aborts_read() {
        let mut driver = FakeDriver::new(PageState::default());
        driver.fail_with_driver_error();

        let err = PageState::read(&mut driver).await.unwrap_err();
        assert!(matches!(err, PagescopeError::Driver(_)));
    }

    #[tokio::test]
    async fn test_read_static_leaves_network_log_alone() {
        let mut driver = FakeDriver::new(PageState {
            text_nodes: Some(vec!["hello".into()]),
            page_source: Some("<p>hello</p>".into()),
            scripts: Some(vec![ScriptElement::inline("1")]),
            network_log: Some(vec![LogEntry::new("{}".into(), 1.0)]),
        })
        .draining_network_log();

        let state = PageState::read_static(&mut driver).await.unwrap();
        assert!(state.text_nodes.is_none());
        assert!(state.network_log.is_none());
        assert_eq!(state.scripts.unwrap().len(), 1);

        let full = PageState::read(&mut driver).await.unwrap();
        assert_eq!(full.network_log.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_screenshot_base64() {
        let mut driver = FakeDriver::new(PageState::default());
        let encoded = screenshot_base64(&mut driver).await.unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), FakeDriver::PNG_BYTES);
    }

    #[test]
    fn test_script_element_deserializes_null_src() {
        let script: ScriptElement =
            serde_json::from_str(r#"{"src": null, "content": "var a;"}"#).unwrap();
        assert_eq!(script, ScriptElement::inline("var a;"));
    }
}
