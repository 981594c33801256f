//! Polling orchestration: one snapshot per tick, one latest-snapshot slot per run.

use crate::analysis::{
    deep_analysis, selector_text, ContentExtractor, EncryptionAnalyzer, NetworkObserver,
    DEFAULT_KEYWORDS,
};
use crate::driver::{screenshot_base64, PageDriver, PageState};
use crate::types::{
    unix_timestamp, AnalyzeOutcome, EncryptionAnalysis, PageReport, PagescopeError, Result,
    Snapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Latest completed snapshot, `None` until the first tick finishes.
pub type LatestSnapshot = Option<Arc<Snapshot>>;

/// Settings for one collection run.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Domain keywords flagged in visible text.
    pub keywords: Vec<String>,
    /// Sleep between ticks.
    pub interval: Duration,
    /// Stop on its own after this many ticks.
    pub max_ticks: Option<u64>,
    /// CSS selector to wait for after navigation, before the first tick.
    pub wait_for: Option<String>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            interval: Duration::from_secs(10),
            max_ticks: None,
            wait_for: None,
        }
    }
}

/// Runs all analyzers over one page state and merges the results.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    extractor: ContentExtractor,
    observer: NetworkObserver,
    analyzer: EncryptionAnalyzer,
}

impl Collector {
    pub fn new(settings: &CollectorSettings) -> Self {
        Self {
            extractor: ContentExtractor::new(&settings.keywords),
            observer: NetworkObserver::new(),
            analyzer: EncryptionAnalyzer::new(),
        }
    }

    /// Build a snapshot from an already-read page state.
    pub fn snapshot(&self, page: &PageState) -> Snapshot {
        Snapshot {
            visible_data: self.extractor.extract(page),
            network_data: self.observer.observe(page),
            encryption_analysis: self.analyzer.analyze(page),
            timestamp: unix_timestamp(),
        }
    }

    /// Read the live page and build a snapshot. Only driver failures are returned.
    pub async fn tick<D: PageDriver>(&self, driver: &mut D) -> Result<Snapshot> {
        let page = PageState::read(driver).await?;
        Ok(self.snapshot(&page))
    }

    /// Run only the encryption analysis against the live page.
    ///
    /// Reads scripts and source only; the network log is left for the next tick.
    pub async fn analyze_page<D: PageDriver>(&self, driver: &mut D) -> Result<EncryptionAnalysis> {
        let page = PageState::read_static(driver).await?;
        Ok(self.analyzer.analyze(&page))
    }

    /// Text of the elements matching `selector`, waiting for the first to appear.
    ///
    /// A selector that never matches or cannot be read yields an empty list.
    pub async fn element_text<D: PageDriver>(
        &self,
        driver: &mut D,
        selector: &str,
    ) -> Result<Vec<String>> {
        let raw = match driver.wait_for_element(selector).await {
            Ok(()) => driver.element_texts(selector).await,
            Err(e) => Err(e),
        };

        match raw {
            Ok(raw) => Ok(selector_text(raw)),
            Err(e) if e.is_driver_failure() => Err(e),
            Err(e) => {
                warn!("No text for {}: {}", selector, e);
                Ok(Vec::new())
            }
        }
    }

    /// Analysis of the live page, plus selector text and a base64 PNG when requested.
    pub async fn inspect<D: PageDriver>(
        &self,
        driver: &mut D,
        target_url: &str,
        selector: Option<&str>,
        screenshot: bool,
    ) -> Result<PageReport> {
        let selector_text = match selector {
            Some(selector) => Some(self.element_text(driver, selector).await?),
            None => None,
        };
        let analysis = self.analyze_page(driver).await?;
        let screenshot = if screenshot {
            Some(screenshot_base64(driver).await?)
        } else {
            None
        };

        Ok(PageReport {
            target_url: target_url.to_string(),
            analysis,
            selector_text,
            screenshot,
        })
    }
}

/// One collection run against one target, owning its driver and snapshot slot.
pub struct CollectionSession<D: PageDriver> {
    target_url: String,
    collector: Collector,
    driver: Arc<Mutex<D>>,
    latest: watch::Receiver<LatestSnapshot>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<Result<()>>>,
}

impl<D: PageDriver> CollectionSession<D> {
    /// Navigate to `target_url` and start the polling worker.
    ///
    /// If navigation fails the driver is closed and the error returned.
    pub async fn start(mut driver: D, target_url: &str, settings: CollectorSettings) -> Result<Self> {
        if let Err(e) = driver.navigate(target_url).await {
            error!("Failed to open {}: {}", target_url, e);
            driver.close().await;
            return Err(e);
        }

        if let Some(selector) = settings.wait_for.as_deref() {
            match driver.wait_for_element(selector).await {
                Ok(()) => debug!("Found {}", selector),
                Err(e) if e.is_driver_failure() => {
                    error!("Browser failed while waiting for {}: {}", selector, e);
                    driver.close().await;
                    return Err(e);
                }
                Err(e) => warn!("{} (collecting anyway)", e),
            }
        }

        let collector = Collector::new(&settings);
        let driver = Arc::new(Mutex::new(driver));
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_loop(
            collector.clone(),
            driver.clone(),
            tx,
            cancel.clone(),
            settings,
        ));

        info!("Collection started for {}", target_url);
        Ok(Self {
            target_url: target_url.to_string(),
            collector,
            driver,
            latest: rx,
            cancel,
            worker: Some(worker),
        })
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// The most recently completed snapshot, if any.
    pub fn latest(&self) -> LatestSnapshot {
        self.latest.borrow().clone()
    }

    /// Receiver notified on every new snapshot. Closed when the worker exits.
    pub fn subscribe(&self) -> watch::Receiver<LatestSnapshot> {
        self.latest.clone()
    }

    /// Whether the worker is still polling.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished())
    }

    /// Live analysis while the run is active, static guidance otherwise.
    pub async fn analyze_now(&self, url: &str) -> AnalyzeOutcome {
        if !self.is_active() {
            return AnalyzeOutcome::Guidance(deep_analysis(url));
        }

        let mut driver = self.driver.lock().await;
        match self.collector.analyze_page(&mut *driver).await {
            Ok(analysis) => AnalyzeOutcome::Live(analysis),
            Err(e) => {
                warn!("Live analysis failed, returning guidance: {}", e);
                AnalyzeOutcome::Guidance(deep_analysis(url))
            }
        }
    }

    /// PNG capture of the page while the run is active.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        if !self.is_active() {
            return Err(PagescopeError::SessionInactive);
        }
        self.driver.lock().await.screenshot().await
    }

    /// Text of the elements matching `selector` while the run is active.
    pub async fn element_text(&self, selector: &str) -> Result<Vec<String>> {
        if !self.is_active() {
            return Err(PagescopeError::SessionInactive);
        }
        let mut driver = self.driver.lock().await;
        self.collector.element_text(&mut *driver, selector).await
    }

    /// Request a stop and wait for the worker to finish and release the browser.
    ///
    /// The worker notices the request at its next iteration boundary. Returns the
    /// driver failure that ended the run, if one did.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        match worker.await {
            Ok(result) => result,
            Err(e) => Err(PagescopeError::Driver(format!(
                "Collection worker did not finish cleanly: {}",
                e
            ))),
        }
    }
}

impl<D: PageDriver> Drop for CollectionSession<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop<D: PageDriver>(
    collector: Collector,
    driver: Arc<Mutex<D>>,
    latest: watch::Sender<LatestSnapshot>,
    cancel: CancellationToken,
    settings: CollectorSettings,
) -> Result<()> {
    let mut ticks: u64 = 0;

    let outcome = loop {
        if cancel.is_cancelled() {
            info!("Stop requested, ending collection");
            break Ok(());
        }

        let result = {
            let mut driver = driver.lock().await;
            collector.tick(&mut *driver).await
        };

        match result {
            Ok(snapshot) => {
                ticks += 1;
                debug!("Tick {} complete", ticks);
                latest.send_replace(Some(Arc::new(snapshot)));
            }
            Err(e) => {
                error!("Collection tick failed: {}", e);
                break Err(e);
            }
        }

        if settings.max_ticks.is_some_and(|max| ticks >= max) {
            info!("Reached {} ticks, ending collection", ticks);
            break Ok(());
        }

        tokio::time::sleep(settings.interval).await;
    };

    driver.lock().await.close().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::FakeDriver;
    use crate::driver::{LogEntry, ScriptElement};
    use std::sync::atomic::Ordering;

    fn game_page() -> PageState {
        PageState {
            text_nodes: Some(vec![
                "Win multiplier 2.5x, cashout now!".to_string(),
                "  ".to_string(),
            ]),
            page_source: Some(r#"<i data-k="aGVsbG8gd29ybGQgZW5jcnlwdGVk"></i>"#.to_string()),
            scripts: Some(vec![ScriptElement::inline(r#"api_key: "abc123XYZ""#)]),
            network_log: Some(vec![LogEntry::new(
                serde_json::json!({
                    "message": {
                        "method": "Network.requestWillBeSent",
                        "params": { "request": { "url": "https://x.test/api/round", "method": "POST" } }
                    }
                })
                .to_string(),
                1.0,
            )]),
        }
    }

    fn fast_settings(max_ticks: Option<u64>) -> CollectorSettings {
        CollectorSettings {
            interval: Duration::from_millis(50),
            max_ticks,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tick_merges_all_analyzers() {
        let collector = Collector::default();
        let mut driver = FakeDriver::new(game_page());

        let snapshot = collector.tick(&mut driver).await.unwrap();

        assert_eq!(
            snapshot.visible_data.game_elements,
            vec!["Win multiplier 2.5x, cashout now!"]
        );
        assert!(snapshot.visible_data.numeric_data.contains(&"2.5".to_string()));
        assert_eq!(snapshot.network_data.api_calls.len(), 1);
        assert_eq!(snapshot.encryption_analysis.suspicious_strings.len(), 1);
        assert_eq!(
            snapshot.encryption_analysis.javascript_analysis["script_0"]["api_key"],
            vec!["abc123XYZ".to_string()]
        );
        assert!(snapshot.timestamp > 0.0);
    }

    #[tokio::test]
    async fn test_tick_degrades_on_missing_facets() {
        let collector = Collector::default();
        let mut driver = FakeDriver::new(PageState::default());

        let snapshot = collector.tick(&mut driver).await.unwrap();
        assert!(snapshot.visible_data.text_content.is_empty());
        assert_eq!(snapshot.network_data, Default::default());
        assert_eq!(snapshot.encryption_analysis, Default::default());
    }

    #[tokio::test]
    async fn test_tick_surfaces_driver_failure() {
        let collector = Collector::default();
        let mut driver = FakeDriver::new(game_page());
        driver.fail_with_driver_error();

        assert!(collector.tick(&mut driver).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_mid_sleep_tears_down_driver() {
        let driver = FakeDriver::new(game_page());
        let reads = driver.reads.clone();
        let closed = driver.closed.clone();

        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(None))
            .await
            .unwrap();
        assert!(session.is_active());

        let mut updates = session.subscribe();
        updates.wait_for(|s| s.is_some()).await.unwrap();

        session.stop().await.unwrap();

        assert!(closed.load(Ordering::SeqCst));
        assert!(!session.is_active());
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(session.latest().is_some());
    }

    #[tokio::test]
    async fn test_latest_is_empty_before_first_tick() {
        let driver = FakeDriver::new(game_page());
        let mut session = CollectionSession::start(
            driver,
            "https://x.test",
            CollectorSettings {
                interval: Duration::from_secs(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Hold the driver so the first tick cannot complete yet.
        let guard = session.driver.clone();
        let held = guard.lock().await;
        assert!(session.latest().is_none());
        drop(held);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_max_ticks_ends_run() {
        let driver = FakeDriver::new(game_page());
        let reads = driver.reads.clone();
        let closed = driver.closed.clone();

        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(Some(2)))
            .await
            .unwrap();

        let mut updates = session.subscribe();
        let closed_channel = tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|_| false),
        )
        .await
        .unwrap();
        assert!(closed_channel.is_err());

        session.stop().await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_navigation_failure_closes_driver() {
        let mut driver = FakeDriver::new(game_page());
        driver.fail_with_driver_error();
        let closed = driver.closed.clone();

        let result = CollectionSession::start(driver, "https://x.test", fast_settings(None)).await;
        assert!(result.is_err());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_analyze_now_live_then_guidance() {
        let driver = FakeDriver::new(game_page());
        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(None))
            .await
            .unwrap();

        match session.analyze_now("https://x.test").await {
            AnalyzeOutcome::Live(analysis) => {
                assert_eq!(analysis.potential_keys.len(), 1);
            }
            other => panic!("Expected live analysis, got {:?}", other),
        }

        session.stop().await.unwrap();

        match session.analyze_now("https://x.test").await {
            AnalyzeOutcome::Guidance(guidance) => {
                assert_eq!(guidance.target_url, "https://x.test");
            }
            other => panic!("Expected guidance, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_page_keeps_network_log_for_next_tick() {
        let collector = Collector::default();
        let mut driver = FakeDriver::new(game_page()).draining_network_log();

        collector.analyze_page(&mut driver).await.unwrap();
        let snapshot = collector.tick(&mut driver).await.unwrap();
        assert_eq!(snapshot.network_data.requests.len(), 1);

        let next = collector.tick(&mut driver).await.unwrap();
        assert!(next.network_data.requests.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_now_does_not_consume_requests() {
        let driver = FakeDriver::new(game_page()).draining_network_log();
        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(None))
            .await
            .unwrap();

        assert!(matches!(
            session.analyze_now("https://x.test").await,
            AnalyzeOutcome::Live(_)
        ));

        let mut updates = session.subscribe();
        let first = updates
            .wait_for(|s| s.is_some())
            .await
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(first.network_data.requests.len(), 1);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_page_access_failures_keep_run_alive() {
        // Every facet fails at page level, as while a page reloads.
        let driver = FakeDriver::new(PageState::default());
        let closed = driver.closed.clone();

        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(Some(2)))
            .await
            .unwrap();

        let mut updates = session.subscribe();
        let _ = tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|_| false)).await;

        assert!(session.stop().await.is_ok());
        assert!(closed.load(Ordering::SeqCst));
        let latest = session.latest().unwrap();
        assert!(latest.visible_data.text_content.is_empty());
        assert_eq!(latest.visible_data.timestamps.len(), 1);
    }

    #[tokio::test]
    async fn test_element_text_and_missing_selector() {
        let collector = Collector::default();
        let mut driver =
            FakeDriver::new(game_page()).with_elements(".multiplier", &[" 1.84x ", "", "2.10x"]);

        let texts = collector.element_text(&mut driver, ".multiplier").await.unwrap();
        assert_eq!(texts, vec!["1.84x", "2.10x"]);

        let none = collector.element_text(&mut driver, "#absent").await.unwrap();
        assert!(none.is_empty());

        driver.fail_with_driver_error();
        assert!(collector.element_text(&mut driver, ".multiplier").await.is_err());
    }

    #[tokio::test]
    async fn test_inspect_collects_requested_extras() {
        let collector = Collector::default();
        let mut driver = FakeDriver::new(game_page()).with_elements("#crash", &["3.2x"]);

        let report = collector
            .inspect(&mut driver, "https://x.test", Some("#crash"), true)
            .await
            .unwrap();
        assert_eq!(report.target_url, "https://x.test");
        assert_eq!(report.selector_text, Some(vec!["3.2x".to_string()]));
        assert!(report.screenshot.is_some());
        assert_eq!(report.analysis.potential_keys.len(), 1);

        let bare = collector
            .inspect(&mut driver, "https://x.test", None, false)
            .await
            .unwrap();
        assert!(bare.selector_text.is_none());
        assert!(bare.screenshot.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_selector_before_collecting() {
        // A selector that never shows up is not fatal.
        let driver = FakeDriver::new(game_page()).with_elements("#game", &["ready"]);
        let settings = CollectorSettings {
            wait_for: Some("#missing".to_string()),
            ..fast_settings(Some(1))
        };

        let mut session = CollectionSession::start(driver, "https://x.test", settings)
            .await
            .unwrap();
        session
            .subscribe()
            .wait_for(|s| s.is_some())
            .await
            .unwrap();
        session.stop().await.unwrap();
        assert!(session.latest().is_some());
    }

    #[tokio::test]
    async fn test_session_screenshot_and_selector_only_while_active() {
        let driver = FakeDriver::new(game_page()).with_elements("#crash", &["1.5x"]);
        let mut session = CollectionSession::start(driver, "https://x.test", fast_settings(None))
            .await
            .unwrap();

        assert_eq!(session.screenshot().await.unwrap(), FakeDriver::PNG_BYTES);
        assert_eq!(session.element_text("#crash").await.unwrap(), vec!["1.5x"]);

        session.stop().await.unwrap();
        assert!(matches!(
            session.screenshot().await,
            Err(PagescopeError::SessionInactive)
        ));
        assert!(matches!(
            session.element_text("#crash").await,
            Err(PagescopeError::SessionInactive)
        ));
    }
}
