//! Named regex rules for encryption-looking content.
//!
//! Matching is purely lexical: a hit means "this text has the shape of a
//! scheme name, an encoded blob or a credential", nothing more.

use crate::types::PatternMatches;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::trace;

/// Cap for scheme-name and encoded-blob rules.
pub const CONTENT_MATCH_CAP: usize = 5;
/// Cap for credential-shaped rules.
pub const KEY_MATCH_CAP: usize = 3;

/// What a rule looks for, which decides how matches are taken and capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    /// Encryption scheme names (AES, RSA, ...).
    Scheme,
    /// Encoded-looking tokens (base64, hex, JWT).
    Encoded,
    /// `key: "value"` assignments; the value is the first capture group.
    Credential,
}

impl RuleCategory {
    /// Maximum matches reported for a rule of this category.
    pub fn cap(self) -> usize {
        match self {
            RuleCategory::Credential => KEY_MATCH_CAP,
            RuleCategory::Scheme | RuleCategory::Encoded => CONTENT_MATCH_CAP,
        }
    }
}

/// A single named rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: &'static str,
    pub category: RuleCategory,
    regex: Regex,
}

impl PatternRule {
    fn new(name: &'static str, category: RuleCategory, pattern: &str) -> Self {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("built-in pattern must compile");
        Self { name, category, regex }
    }

    /// De-duplicated, order-stable matches, truncated to the category cap.
    pub fn find(&self, text: &str) -> Vec<String> {
        let cap = self.category.cap();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for caps in self.regex.captures_iter(text) {
            let m = match self.category {
                RuleCategory::Credential => caps.get(1),
                RuleCategory::Scheme | RuleCategory::Encoded => caps.get(0),
            };
            let Some(m) = m else { continue };
            if seen.insert(m.as_str()) {
                found.push(m.as_str().to_string());
                if found.len() == cap {
                    break;
                }
            }
        }

        found
    }
}

/// The fixed rule set applied to script content.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

impl PatternMatcher {
    /// Create a matcher with the built-in rules.
    pub fn new() -> Self {
        use RuleCategory::*;

        Self {
            rules: vec![
                PatternRule::new("aes", Scheme, r"AES|CBC|ECB|CTR|GCM"),
                PatternRule::new("rsa", Scheme, r"RSA|PKCS|OAEP"),
                PatternRule::new("base64", Encoded, r"[A-Za-z0-9+/]{20,}={0,2}"),
                PatternRule::new("hex", Encoded, r"[0-9A-Fa-f]{16,}"),
                PatternRule::new(
                    "json_web_token",
                    Encoded,
                    r"eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9._-]*\.[A-Za-z0-9._-]*",
                ),
                PatternRule::new(
                    "api_key",
                    Credential,
                    r#"api[_-]?key["']?\s*:\s*["']([^"']+)["']"#,
                ),
                PatternRule::new("secret", Credential, r#"secret["']?\s*:\s*["']([^"']+)["']"#),
                PatternRule::new("token", Credential, r#"token["']?\s*:\s*["']([^"']+)["']"#),
            ],
        }
    }

    /// All rules, in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Category of the named rule, if it exists.
    pub fn category_of(&self, name: &str) -> Option<RuleCategory> {
        self.rules.iter().find(|r| r.name == name).map(|r| r.category)
    }

    /// Apply every rule to `text`. Rules without matches are absent from the result.
    pub fn find_all(&self, text: &str) -> PatternMatches {
        let mut results = PatternMatches::new();

        for rule in &self.rules {
            let found = rule.find(text);
            if !found.is_empty() {
                trace!("Rule {} matched {} value(s)", rule.name, found.len());
                results.insert(rule.name.to_string(), found);
            }
        }

        results
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}
