//! Visible-text extraction from a rendered page.

use crate::driver::PageState;
use crate::types::{unix_timestamp, VisibleData};
use regex::Regex;
use tracing::{debug, warn};

/// Text fragments this long (in characters) or longer are dropped.
pub const MAX_TEXT_LEN: usize = 1000;

/// Keywords flagged by default (betting/crash-game vocabulary).
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "bet",
    "stake",
    "win",
    "multiplier",
    "cashout",
    "aviator",
    "flight",
];

/// Pulls visible text, numbers and keyword lines out of a page.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    keywords: Vec<String>,
    numeric_pattern: Regex,
}

impl ContentExtractor {
    /// Create an extractor flagging the given keywords (matched case-insensitively).
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            keywords,
            numeric_pattern: Regex::new(r"\d+(?:\.\d+)?").expect("numeric pattern must compile"),
        }
    }

    /// Configured keywords, lowercased.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Extract visible data. Never fails; a missing text facet yields empty lists.
    pub fn extract(&self, page: &PageState) -> VisibleData {
        let mut data = VisibleData::default();

        match page.text_nodes.as_deref() {
            Some(nodes) => {
                data.text_content = nodes
                    .iter()
                    .map(|t| t.trim())
                    .filter(|t| is_retained(t))
                    .map(str::to_string)
                    .collect();
            }
            None => warn!("Text nodes unavailable, returning partial visible data"),
        }

        for text in &data.text_content {
            data.numeric_data.extend(
                self.numeric_pattern
                    .find_iter(text)
                    .map(|m| m.as_str().to_string()),
            );

            if self.has_keyword(text) {
                data.game_elements.push(text.clone());
            }
        }

        data.timestamps.push(unix_timestamp());

        debug!(
            "Extracted {} text fragments, {} numbers, {} keyword lines",
            data.text_content.len(),
            data.numeric_data.len(),
            data.game_elements.len()
        );
        data
    }

    fn has_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

/// Trimmed text of selector-matched elements, empty ones dropped.
pub fn selector_text(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Trimmed text is kept when non-empty and under the length ceiling.
fn is_retained(trimmed: &str) -> bool {
    !trimmed.is_empty() && trimmed.chars().count() < MAX_TEXT_LEN
}
