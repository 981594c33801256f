//! In-memory driver serving a frozen page, for tests.

use super::{LogEntry, PageDriver, PageState, ScriptElement};
use crate::types::{PagescopeError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Serves the same page on every read. Facets that are `None` fail with `PageAccess`.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    page: PageState,
    elements: BTreeMap<String, Vec<String>>,
    driver_error: bool,
    drain_network_log: bool,
    pub navigations: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl FakeDriver {
    /// PNG signature returned by every screenshot.
    pub const PNG_BYTES: &'static [u8] = b"\x89PNG\r\n\x1a\n";

    pub fn new(page: PageState) -> Self {
        Self {
            page,
            elements: BTreeMap::new(),
            driver_error: false,
            drain_network_log: false,
            navigations: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand out the network log once, like a real DevTools log buffer.
    pub fn draining_network_log(mut self) -> Self {
        self.drain_network_log = true;
        self
    }

    /// Elements matching `selector` render as `texts`.
    pub fn with_elements(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Make every subsequent call fail as if the browser crashed.
    pub fn fail_with_driver_error(&mut self) {
        self.driver_error = true;
    }

    fn check_alive(&self) -> Result<()> {
        if self.driver_error {
            return Err(PagescopeError::Driver("browser went away".to_string()));
        }
        Ok(())
    }

    fn serve<T: Clone>(&self, facet: &Option<T>, name: &str) -> Result<T> {
        self.check_alive()?;
        facet
            .clone()
            .ok_or_else(|| PagescopeError::PageAccess(format!("{} unavailable", name)))
    }
}

impl PageDriver for FakeDriver {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        if self.driver_error {
            return Err(PagescopeError::Driver("navigation failed".to_string()));
        }
        self.navigations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn text_nodes(&mut self) -> Result<Vec<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.serve(&self.page.text_nodes, "text nodes")
    }

    async fn page_source(&mut self) -> Result<String> {
        self.serve(&self.page.page_source, "page source")
    }

    async fn network_log(&mut self) -> Result<Vec<LogEntry>> {
        let entries = self.serve(&self.page.network_log, "network log")?;
        if self.drain_network_log {
            self.page.network_log = Some(Vec::new());
        }
        Ok(entries)
    }

    async fn scripts(&mut self) -> Result<Vec<ScriptElement>> {
        self.serve(&self.page.scripts, "scripts")
    }

    async fn element_texts(&mut self, selector: &str) -> Result<Vec<String>> {
        self.check_alive()?;
        Ok(self.elements.get(selector).cloned().unwrap_or_default())
    }

    async fn wait_for_element(&mut self, selector: &str) -> Result<()> {
        self.check_alive()?;
        if self.elements.contains_key(selector) {
            Ok(())
        } else {
            Err(PagescopeError::PageAccess(format!(
                "Timed out waiting for {}",
                selector
            )))
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.check_alive()?;
        Ok(Self::PNG_BYTES.to_vec())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
