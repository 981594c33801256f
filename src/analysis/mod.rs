//! Page analyzers.
//!
//! Each analyzer reads one frozen [`PageState`](crate::driver::PageState) and
//! never fails; unreadable facets are logged and yield partial results:
//! - Visible text, numbers and keyword lines
//! - Requests and websocket frames from the network log
//! - Encryption-looking strings in scripts and page source (heuristic only)

pub mod content;
pub mod encryption;
pub mod network;
pub mod patterns;

pub use content::{selector_text, ContentExtractor, DEFAULT_KEYWORDS};
pub use encryption::{deep_analysis, EncryptionAnalyzer};
pub use network::NetworkObserver;
pub use patterns::{PatternMatcher, RuleCategory};
