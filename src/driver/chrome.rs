//! Chrome DevTools implementation of [`PageDriver`].
//!
//! Launches Chromium through chromiumoxide, keeps one page open and records
//! request/websocket events into a bounded in-memory log shaped like Chrome's
//! performance log, so the collector sees the same records a DevTools log
//! consumer would.
//!
//! Requires: Chrome or Chromium browser installed (or `pagescope setup`).

use super::{LogEntry, PageDriver, ScriptElement};
use crate::analysis::network::{
    REQUEST_WILL_BE_SENT, WEBSOCKET_FRAME_RECEIVED, WEBSOCKET_FRAME_SENT,
};
use crate::types::{unix_timestamp, PagescopeError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventWebSocketFrameReceived, EventWebSocketFrameSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counter for generating unique browser profile directories
static BROWSER_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Oldest log entries are dropped past this size.
pub const LOG_BUFFER_CAPACITY: usize = 1000;

/// Hides `navigator.webdriver` before any page script runs.
const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Rendered text of every element with a direct text child, in document order.
///
/// `innerText` of an element that is not rendered is its raw `textContent`,
/// so script/style bodies and hidden nodes report `''` instead.
const TEXT_NODES_SCRIPT: &str = r#"(() => {
    const unrendered = 'script,style,noscript,template,head';
    const snapshot = document.evaluate('//*[text()]', document, null,
        XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    const out = [];
    for (let i = 0; i < snapshot.snapshotLength; i++) {
        const el = snapshot.snapshotItem(i);
        const visible = typeof el.innerText === 'string'
            && !el.closest(unrendered)
            && el.getClientRects().length > 0;
        out.push(visible ? el.innerText : '');
    }
    return out;
})()"#;

const SCRIPTS_SCRIPT: &str = r#"Array.from(document.getElementsByTagName('script'))
    .map(s => ({ src: s.getAttribute('src'), content: s.innerHTML }))"#;

/// Poll period while waiting for a selector.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Chromium flags. The usual automation defaults, minus `--enable-automation`
/// which shows the "controlled by automated software" bar and sets
/// `navigator.webdriver`.
const CHROME_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-component-extensions-with-background-pages",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-features=TranslateUI",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
    "--lang=en_US",
    "--disable-blink-features=AutomationControlled",
];

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Navigation timeout.
    pub timeout: Duration,
    /// Extra wait after navigation for client-side rendering.
    pub settle: Duration,
    /// Explicit path to Chrome/Chromium executable
    pub chrome_executable: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(3),
            chrome_executable: None,
        }
    }
}

type SharedLog = Arc<Mutex<VecDeque<LogEntry>>>;

/// A live Chromium session with one page.
pub struct ChromeDriver {
    browser: Option<Browser>,
    page: Page,
    options: LaunchOptions,
    log: SharedLog,
    tasks: Vec<JoinHandle<()>>,
    temp_dir: PathBuf,
}

impl ChromeDriver {
    /// Launch a browser (with auto-download fallback) and open a blank page.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let instance_id = BROWSER_INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "pagescope-browser-{}-{}",
            std::process::id(),
            instance_id
        ));

        if let Err(e) = std::fs::create_dir_all(&temp_dir) {
            debug!("Failed to create temp dir {:?}: {}", temp_dir, e);
        }

        let (browser, mut handler) = match launch_browser(&options, &temp_dir).await {
            Ok(pair) => pair,
            Err(e) => {
                teardown(None, Vec::new(), temp_dir).await;
                return Err(e);
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let log: SharedLog = Arc::new(Mutex::new(VecDeque::new()));
        let mut tasks = vec![handler_task];

        let page = match open_page(&browser, &log, &mut tasks).await {
            Ok(page) => page,
            Err(e) => {
                teardown(Some(browser), tasks, temp_dir).await;
                return Err(e);
            }
        };

        info!("Browser session ready");
        Ok(Self {
            browser: Some(browser),
            page,
            options,
            log,
            tasks,
            temp_dir,
        })
    }
}

impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        info!("Navigating to: {}", url);
        match tokio::time::timeout(self.options.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => debug!("Navigation completed"),
            Ok(Err(e)) => {
                return Err(PagescopeError::Driver(format!("Navigation failed: {}", e)));
            }
            Err(_) => warn!("Navigation timeout (continuing with partially loaded page)"),
        }

        tokio::time::sleep(self.options.settle).await;
        Ok(())
    }

    async fn text_nodes(&mut self) -> Result<Vec<String>> {
        evaluate(&self.page, TEXT_NODES_SCRIPT).await
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page.content().await.map_err(classify_cdp_error)
    }

    async fn network_log(&mut self) -> Result<Vec<LogEntry>> {
        let mut log = self.log.lock().await;
        Ok(log.drain(..).collect())
    }

    async fn scripts(&mut self) -> Result<Vec<ScriptElement>> {
        evaluate(&self.page, SCRIPTS_SCRIPT).await
    }

    async fn element_texts(&mut self, selector: &str) -> Result<Vec<String>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(classify_cdp_error)?;

        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            match element.inner_text().await {
                Ok(Some(text)) => texts.push(text),
                Ok(None) => {}
                Err(e) => {
                    let err = classify_cdp_error(e);
                    if err.is_driver_failure() {
                        return Err(err);
                    }
                    debug!("Skipping unreadable element for {}: {}", selector, err);
                }
            }
        }
        Ok(texts)
    }

    async fn wait_for_element(&mut self, selector: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.options.timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    let err = classify_cdp_error(e);
                    if err.is_driver_failure() {
                        return Err(err);
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(PagescopeError::PageAccess(format!(
                    "Timed out after {}s waiting for {}",
                    self.options.timeout.as_secs(),
                    selector
                )));
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(classify_cdp_error)
    }

    async fn close(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };

        let tasks = std::mem::take(&mut self.tasks);
        teardown(Some(browser), tasks, self.temp_dir.clone()).await;
        info!("Browser session closed");
    }
}

/// Close the browser, stop background tasks and remove the profile directory.
///
/// Directory removal runs in the background after a short delay so the
/// browser process can release its files; its handle is returned.
async fn teardown(
    browser: Option<Browser>,
    tasks: Vec<JoinHandle<()>>,
    temp_dir: PathBuf,
) -> JoinHandle<()> {
    if let Some(mut browser) = browser {
        if let Err(e) = browser.close().await {
            debug!("Browser close returned an error: {}", e);
        }
    }
    for task in tasks {
        task.abort();
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
            debug!("Failed to cleanup temp dir {:?}: {}", temp_dir, e);
        }
    })
}

/// Run `script` in the page and decode its result.
async fn evaluate<T: serde::de::DeserializeOwned>(page: &Page, script: &str) -> Result<T> {
    let result = page.evaluate(script).await.map_err(classify_cdp_error)?;
    result
        .into_value::<T>()
        .map_err(|e| PagescopeError::PageAccess(format!("Unexpected script result: {}", e)))
}

/// Split CDP failures into session-ending and page-level ones.
///
/// Lost connections and dead browser processes end the session. Script
/// exceptions, protocol errors ("Execution context was destroyed" while the
/// page reloads), missing frames and timeouts only affect the current read.
fn classify_cdp_error(e: CdpError) -> PagescopeError {
    match &e {
        CdpError::Ws(_)
        | CdpError::Io(_)
        | CdpError::NoResponse
        | CdpError::UnexpectedWsMessage(_)
        | CdpError::ChannelSendError(_)
        | CdpError::LaunchExit(..)
        | CdpError::LaunchTimeout(_)
        | CdpError::LaunchIo(..) => PagescopeError::Driver(e.to_string()),
        _ => PagescopeError::PageAccess(e.to_string()),
    }
}

/// Failures while bringing the session up are always fatal.
fn setup_error(e: CdpError) -> PagescopeError {
    PagescopeError::Driver(format!("Browser setup failed: {}", e))
}

/// Build a BrowserConfig with the given temp directory.
fn build_browser_config(
    options: &LaunchOptions,
    temp_dir: &std::path::Path,
    chrome_exe: Option<&std::path::Path>,
) -> Result<BrowserConfig> {
    let mut config_builder = BrowserConfig::builder().user_data_dir(temp_dir);

    if let Some(exe) = chrome_exe {
        config_builder = config_builder.chrome_executable(exe);
    }

    if !options.headless {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .disable_default_args()
        .args(CHROME_ARGS.iter().copied())
        .no_sandbox()
        .viewport(None);

    config_builder
        .build()
        .map_err(|e| PagescopeError::Config(format!("Failed to build browser config: {}", e)))
}

/// Launch a browser, with auto-download fallback if no Chrome is found.
async fn launch_browser(
    options: &LaunchOptions,
    temp_dir: &std::path::Path,
) -> Result<(
    Browser,
    impl futures::Stream<Item = std::result::Result<(), CdpError>>,
)> {
    // Resolve Chrome executable: explicit path > previously downloaded > system Chrome
    let chrome_exe = options
        .chrome_executable
        .clone()
        .or_else(crate::browser::resolve_chrome_executable);

    let launch_result = match build_browser_config(options, temp_dir, chrome_exe.as_deref()) {
        Ok(config) => Browser::launch(config).await,
        Err(e) => Err(CdpError::msg(e.to_string())),
    };

    match launch_result {
        Ok(pair) => Ok(pair),
        Err(e) => {
            // If we had an explicit or resolved chrome path, don't try auto-download
            if let Some(exe) = chrome_exe {
                return Err(PagescopeError::Driver(format!(
                    "Failed to launch browser with Chrome at {:?}: {}",
                    exe, e
                )));
            }

            warn!(
                "Chrome not found, downloading Chromium automatically... (run `pagescope setup` to pre-install)"
            );
            let exe = crate::browser::download_chrome(false).await?;

            let config = build_browser_config(options, temp_dir, Some(&exe))?;
            Browser::launch(config).await.map_err(|e| {
                PagescopeError::Driver(format!(
                    "Failed to launch browser even after downloading Chromium: {}",
                    e
                ))
            })
        }
    }
}

/// Open a blank page with the webdriver flag hidden and network recorders attached.
///
/// Recorder tasks are pushed onto `tasks` as they start, so a caller cleaning
/// up after an error stops them too.
async fn open_page(
    browser: &Browser,
    log: &SharedLog,
    tasks: &mut Vec<JoinHandle<()>>,
) -> Result<Page> {
    let page = browser.new_page("about:blank").await.map_err(setup_error)?;
    page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
        HIDE_WEBDRIVER_SCRIPT,
    ))
    .await
    .map_err(setup_error)?;

    let requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(setup_error)?;
    tasks.push(spawn_recorder(requests, REQUEST_WILL_BE_SENT, log.clone()));

    let sent = page
        .event_listener::<EventWebSocketFrameSent>()
        .await
        .map_err(setup_error)?;
    tasks.push(spawn_recorder(sent, WEBSOCKET_FRAME_SENT, log.clone()));

    let received = page
        .event_listener::<EventWebSocketFrameReceived>()
        .await
        .map_err(setup_error)?;
    tasks.push(spawn_recorder(received, WEBSOCKET_FRAME_RECEIVED, log.clone()));

    Ok(page)
}

/// Append each event to the shared log as a performance-log style message.
fn spawn_recorder<S, T>(events: S, method: &'static str, log: SharedLog) -> JoinHandle<()>
where
    S: Stream<Item = Arc<T>> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            let params = match serde_json::to_value(&*event) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Could not serialize {} event: {}", method, e);
                    continue;
                }
            };
            let message = serde_json::json!({ "message": { "method": method, "params": params } });

            let mut log = log.lock().await;
            if log.len() == LOG_BUFFER_CAPACITY {
                log.pop_front();
            }
            log.push_back(LogEntry::new(message.to_string(), unix_timestamp()));
        }
    })
}
