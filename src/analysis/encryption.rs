//! Encryption-indicator heuristics over inline scripts and page source.
//!
//! This is string-shape matching only. A "suspicious string" is something that
//! decodes as base64 to a non-trivial size; no decryption is attempted.

use crate::analysis::patterns::{PatternMatcher, RuleCategory};
use crate::driver::PageState;
use crate::types::{
    DeepAnalysisGuidance, EncryptionAnalysis, EncryptionIndicator, PatternMatches, PotentialKey,
    SuspiciousKind, SuspiciousString,
};
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// At most this many distinct base64 candidates are decoded per page.
pub const MAX_BASE64_CANDIDATES: usize = 10;
/// Candidates must decode to more than this many bytes.
pub const MIN_DECODED_LEN: usize = 5;
/// Length of the encoded preview before truncation.
pub const PREVIEW_LEN: usize = 50;

/// Standard alphabet with required padding, tolerant of non-zero trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Runs the pattern rules over scripts and scans page source for base64 blobs.
#[derive(Debug, Clone)]
pub struct EncryptionAnalyzer {
    matcher: PatternMatcher,
    quoted_base64: Regex,
}

impl EncryptionAnalyzer {
    pub fn new() -> Self {
        Self {
            matcher: PatternMatcher::new(),
            quoted_base64: Regex::new(r#"["']([A-Za-z0-9+/]{20,}={0,2})["']"#)
                .expect("base64 candidate pattern must compile"),
        }
    }

    /// Analyze the page. Missing facets are logged and skipped.
    pub fn analyze(&self, page: &PageState) -> EncryptionAnalysis {
        let mut analysis = EncryptionAnalysis::default();

        match page.scripts.as_deref() {
            Some(scripts) => {
                for (i, script) in scripts.iter().enumerate() {
                    if script.content.is_empty() {
                        continue;
                    }
                    let findings = self.matcher.find_all(&script.content);
                    if findings.is_empty() {
                        continue;
                    }

                    let source = format!("script_{}", i);
                    self.collect_indicators(&source, &findings, &mut analysis);
                    analysis.javascript_analysis.insert(source, findings);
                }
            }
            None => warn!("Inline scripts unavailable, skipping script analysis"),
        }

        match page.page_source.as_deref() {
            Some(source) => analysis.suspicious_strings = self.scan_page_source(source),
            None => warn!("Page source unavailable, skipping base64 scan"),
        }

        debug!(
            "Encryption analysis: {} scripts flagged, {} suspicious strings, {} potential keys",
            analysis.javascript_analysis.len(),
            analysis.suspicious_strings.len(),
            analysis.potential_keys.len()
        );
        analysis
    }

    /// Quoted base64-looking substrings that decode to more than `MIN_DECODED_LEN` bytes.
    pub fn scan_page_source(&self, source: &str) -> Vec<SuspiciousString> {
        let mut seen = HashSet::new();

        self.quoted_base64
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|candidate| seen.insert(*candidate))
            .take(MAX_BASE64_CANDIDATES)
            .filter_map(|candidate| {
                let decoded = LENIENT_BASE64.decode(candidate).ok()?;
                (decoded.len() > MIN_DECODED_LEN).then(|| SuspiciousString {
                    kind: SuspiciousKind::Base64,
                    encoded: preview(candidate),
                    decoded_length: decoded.len(),
                })
            })
            .collect()
    }

    fn collect_indicators(
        &self,
        source: &str,
        findings: &PatternMatches,
        analysis: &mut EncryptionAnalysis,
    ) {
        for (rule, values) in findings {
            match self.matcher.category_of(rule) {
                Some(RuleCategory::Scheme) => {
                    analysis.encryption_indicators.push(EncryptionIndicator {
                        source: source.to_string(),
                        scheme: rule.clone(),
                        matches: values.clone(),
                    });
                }
                Some(RuleCategory::Credential) => {
                    for value in values {
                        let key = PotentialKey {
                            source: source.to_string(),
                            kind: rule.clone(),
                            value: value.clone(),
                        };
                        if !analysis.potential_keys.contains(&key) {
                            analysis.potential_keys.push(key);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

impl Default for EncryptionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Static manual-analysis guidance. Performs no network access.
pub fn deep_analysis(target_url: &str) -> DeepAnalysisGuidance {
    DeepAnalysisGuidance {
        status: "deep_analysis_required".to_string(),
        message: "Use browser devtools for detailed encryption analysis".to_string(),
        target_url: target_url.to_string(),
        recommended_steps: [
            "1. Open Chrome DevTools (F12)",
            "2. Go to Network tab and reload page",
            "3. Look for XHR/Fetch requests with encrypted payloads",
            "4. Check Sources tab for JavaScript encryption functions",
            "5. Search for 'encrypt', 'decrypt', 'CryptoJS' in source code",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

fn preview(encoded: &str) -> String {
    if encoded.len() > PREVIEW_LEN {
        format!("{}...", &encoded[..PREVIEW_LEN])
    } else {
        encoded.to_string()
    }
}
