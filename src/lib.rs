//! pagescope - Browser-driven page watcher.
//!
//! This library drives a browser to a target page and, on a fixed interval:
//! - Scrapes visible text, mines numbers and flags domain keywords
//! - Reconstructs outbound requests and websocket frames from the network log
//! - Pattern-matches scripts and page source for encryption-looking strings
//!
//! The encryption analysis is heuristic string matching; nothing is decrypted
//! or verified.
//!
//! # Example
//!
//! ```no_run
//! use pagescope::collector::{CollectionSession, CollectorSettings};
//! use pagescope::driver::{ChromeDriver, LaunchOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let driver = ChromeDriver::launch(LaunchOptions::default()).await.unwrap();
//!     let mut session = CollectionSession::start(driver, "https://example.com", CollectorSettings::default())
//!         .await
//!         .unwrap();
//!     session.subscribe().wait_for(|s| s.is_some()).await.unwrap();
//!     if let Some(snapshot) = session.latest() {
//!         println!("{} keyword lines", snapshot.visible_data.game_elements.len());
//!     }
//!     session.stop().await.unwrap();
//! }
//! ```

pub mod analysis;
pub mod browser;
pub mod collector;
pub mod config;
pub mod driver;
pub mod notify;
pub mod types;

pub use collector::{CollectionSession, Collector, CollectorSettings};
pub use config::{AnalyzeConfig, CollectConfig, Commands, Config, SetupConfig};
pub use driver::{ChromeDriver, LaunchOptions, PageDriver, PageState};
pub use types::{
    AnalyzeOutcome, EncryptionAnalysis, NetworkData, PageReport, PagescopeError, Result, Snapshot,
    VisibleData,
};
