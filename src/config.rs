//! Command-line configuration.

use crate::analysis::DEFAULT_KEYWORDS;
use crate::collector::CollectorSettings;
use crate::driver::LaunchOptions;
use crate::types::{PagescopeError, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Browser-driven page watcher: visible text, network traffic and encoding heuristics.
#[derive(Parser, Debug, Clone)]
#[command(name = "pagescope")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll a page on an interval and report each snapshot
    Collect(CollectConfig),
    /// Analyze a page's scripts and source once, or print manual-analysis guidance
    Analyze(AnalyzeConfig),
    /// Download and set up a managed Chromium browser
    Setup(SetupConfig),
}

/// Configuration for the setup command.
#[derive(Parser, Debug, Clone)]
pub struct SetupConfig {
    /// Force re-download even if Chromium is already installed
    #[arg(long)]
    pub force: bool,
}

/// Browser options shared by commands that open a page.
#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Navigation timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Seconds to wait after navigation for client-side rendering
    #[arg(long, default_value = "3")]
    pub settle: u64,

    /// Path to Chrome/Chromium executable (overrides auto-detection)
    #[arg(long, env = "PAGESCOPE_CHROME")]
    pub chrome_path: Option<PathBuf>,
}

impl BrowserArgs {
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            timeout: Duration::from_secs(self.timeout),
            settle: Duration::from_secs(self.settle),
            chrome_executable: self.chrome_path.clone(),
        }
    }
}

/// Configuration for the collect command.
#[derive(Parser, Debug, Clone)]
pub struct CollectConfig {
    /// Page to watch
    pub target: String,

    /// Seconds between snapshots
    #[arg(short, long, default_value = "10")]
    pub interval: u64,

    /// Stop after this many snapshots
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Keyword flagged in visible text (repeatable; replaces the defaults)
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Print snapshots as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Write the latest snapshot as JSON to this file after every tick
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Quiet mode: counts only, no item previews
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// CSS selector to wait for before the first snapshot
    #[arg(long, value_name = "CSS")]
    pub wait_for: Option<String>,

    /// Save a PNG of the page to this file after every tick
    #[arg(long, value_name = "PATH")]
    pub screenshot: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

impl CollectConfig {
    /// Core collector settings.
    pub fn settings(&self) -> Result<CollectorSettings> {
        if self.interval == 0 {
            return Err(PagescopeError::Config(
                "Interval must be at least one second".to_string(),
            ));
        }

        let keywords = if self.keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            self.keywords.clone()
        };

        Ok(CollectorSettings {
            keywords,
            interval: Duration::from_secs(self.interval),
            max_ticks: self.ticks,
            wait_for: self.wait_for.clone(),
        })
    }
}

/// Configuration for the analyze command.
#[derive(Parser, Debug, Clone)]
pub struct AnalyzeConfig {
    /// Page to analyze
    pub target: String,

    /// Open the page and analyze it live instead of printing guidance
    #[arg(long)]
    pub live: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Also report the text of elements matching this CSS selector
    #[arg(long, value_name = "CSS", requires = "live")]
    pub selector: Option<String>,

    /// Save a PNG of the page to this file
    #[arg(long, value_name = "PATH", requires = "live")]
    pub screenshot: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Add `https://` when no scheme is given and check the result parses.
pub fn normalize_target(target: &str) -> Result<String> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(PagescopeError::Config("No target URL given".to_string()));
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)?;
    if parsed.host_str().is_none() {
        return Err(PagescopeError::Config(format!(
            "Target has no host: {}",
            target
        )));
    }
    Ok(candidate)
}
