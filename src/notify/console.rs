//! Colored console output for snapshots and analysis results.

use crate::types::{DeepAnalysisGuidance, EncryptionAnalysis, PageReport, Snapshot};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// How many list items are shown under each summary line.
const PREVIEW_ITEMS: usize = 5;

/// Console output handler with colors and formatting.
pub struct ConsoleOutput {
    verbose: bool,
    json_mode: bool,
    quiet: bool,
}

impl ConsoleOutput {
    /// Create a new console output handler.
    pub fn new(verbose: bool, json_mode: bool, quiet: bool) -> Self {
        Self {
            verbose,
            json_mode,
            quiet,
        }
    }

    /// Print collection start message.
    pub fn print_collect_start(&self, target: &str, interval: Duration) {
        if self.json_mode || self.quiet {
            return;
        }

        println!(
            "{} Watching: {} (every {}s, Ctrl-C to stop)",
            "[*]".bright_blue(),
            target.bright_white(),
            interval.as_secs_f64()
        );
    }

    /// Print progress (only in verbose mode).
    pub fn print_progress(&self, message: &str) {
        if self.json_mode || !self.verbose {
            return;
        }

        println!("{} {}", "[.]".dimmed(), message.dimmed());
    }

    /// Print info message.
    pub fn print_info(&self, message: &str) {
        if self.json_mode || self.quiet {
            return;
        }

        println!("{} {}", "[*]".bright_blue(), message);
    }

    /// Print one snapshot: a JSON line in JSON mode, a summary otherwise.
    pub fn print_snapshot(&self, snapshot: &Snapshot) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string(snapshot) {
                println!("{}", json);
            }
            return;
        }

        let visible = &snapshot.visible_data;
        let network = &snapshot.network_data;

        println!();
        println!(
            "{} {:.3}",
            "=== Snapshot @".bright_cyan(),
            snapshot.timestamp
        );
        println!("    |-- Text fragments:  {}", visible.text_content.len());
        println!("    |-- Numbers:         {}", visible.numeric_data.len());
        println!(
            "    |-- Keyword lines:   {}",
            format_count(visible.game_elements.len())
        );
        if !self.quiet {
            for line in visible.game_elements.iter().take(PREVIEW_ITEMS) {
                println!("    |     {}", line.dimmed());
            }
        }
        println!(
            "    |-- Requests:        {} ({} API-like)",
            network.requests.len(),
            format_count(network.api_calls.len())
        );
        if !self.quiet {
            for call in network.api_calls.iter().take(PREVIEW_ITEMS) {
                println!("    |     {} {}", call.method.yellow(), call.url.dimmed());
            }
        }
        println!(
            "    |-- WebSocket frames: {}",
            network.websocket_messages.len()
        );
        self.print_analysis_lines(&snapshot.encryption_analysis);
    }

    /// Print a standalone encryption analysis.
    pub fn print_analysis(&self, analysis: &EncryptionAnalysis) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string_pretty(analysis) {
                println!("{}", json);
            }
            return;
        }

        println!();
        println!("{}", "=== Encryption Indicators (heuristic) ===".bright_cyan());
        self.print_analysis_lines(analysis);
    }

    /// Print a live inspection: the analysis followed by any requested extras.
    pub fn print_report(&self, report: &PageReport, screenshot_path: Option<&std::path::Path>) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string_pretty(report) {
                println!("{}", json);
            }
            return;
        }

        self.print_analysis(&report.analysis);
        if let Some(ref texts) = report.selector_text {
            println!("    |-- Selector matches: {}", texts.len());
            for text in texts.iter().take(if self.quiet { 0 } else { PREVIEW_ITEMS }) {
                println!("    |     {}", text.dimmed());
            }
        }
        if let Some(path) = screenshot_path {
            println!("    +-- Screenshot: {}", path.display().to_string().bright_white());
        }
    }

    /// Print the manual-analysis guidance payload.
    pub fn print_guidance(&self, guidance: &DeepAnalysisGuidance) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string_pretty(guidance) {
                println!("{}", json);
            }
            return;
        }

        println!();
        println!(
            "{} {}",
            "=== Manual analysis:".bright_cyan(),
            guidance.target_url.bright_white()
        );
        println!("  {}", guidance.message);
        for step in &guidance.recommended_steps {
            println!("    {}", step);
        }
    }

    fn print_analysis_lines(&self, analysis: &EncryptionAnalysis) {
        println!(
            "    |-- Flagged scripts: {}",
            format_count(analysis.javascript_analysis.len())
        );
        if !self.quiet {
            for indicator in analysis.encryption_indicators.iter().take(PREVIEW_ITEMS) {
                println!(
                    "    |     {} {} {}",
                    indicator.source.dimmed(),
                    indicator.scheme.yellow(),
                    indicator.matches.join(", ")
                );
            }
        }
        println!(
            "    |-- Suspicious strings: {}",
            format_count(analysis.suspicious_strings.len())
        );
        if !self.quiet {
            for s in analysis.suspicious_strings.iter().take(PREVIEW_ITEMS) {
                println!(
                    "    |     {} ({} bytes decoded)",
                    s.encoded.dimmed(),
                    s.decoded_length
                );
            }
        }
        println!(
            "    +-- Potential keys:  {}",
            format_count(analysis.potential_keys.len())
        );
        for key in analysis.potential_keys.iter().take(PREVIEW_ITEMS) {
            println!(
                "          {} {} = {}",
                key.source.dimmed(),
                key.kind.red(),
                key.value
            );
        }
    }

    /// Create a spinner for a long-running step.
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.json_mode || self.quiet {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }
}

/// Non-zero finding counts stand out.
fn format_count(count: usize) -> colored::ColoredString {
    if count > 0 {
        count.to_string().red().bold()
    } else {
        count.to_string().green()
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(false, false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::deep_analysis;

    #[test]
    fn test_console_output_creation() {
        let output = ConsoleOutput::new(true, false, false);
        assert!(output.verbose);
        assert!(!output.json_mode);
    }

    #[test]
    fn test_spinner_suppressed_in_json_mode() {
        let output = ConsoleOutput::new(false, true, false);
        assert!(output.create_spinner("loading").is_none());
    }

    #[test]
    fn test_print_does_not_panic() {
        let snapshot = Snapshot::default();
        for output in [
            ConsoleOutput::new(false, false, false),
            ConsoleOutput::new(false, true, false),
            ConsoleOutput::new(false, false, true),
        ] {
            output.print_snapshot(&snapshot);
            output.print_analysis(&snapshot.encryption_analysis);
            output.print_guidance(&deep_analysis("https://example.com"));
            output.print_report(
                &PageReport {
                    selector_text: Some(vec!["1.5x".into()]),
                    ..Default::default()
                },
                Some(std::path::Path::new("page.png")),
            );
        }
    }

    #[test]
    fn test_format_count() {
        assert!(format_count(0).to_string().contains('0'));
        assert!(format_count(3).to_string().contains('3'));
    }
}
