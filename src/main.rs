//! pagescope - Browser-driven page watcher.
//!
//! CLI entry point.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use pagescope::analysis::deep_analysis;
use pagescope::config::normalize_target;
use pagescope::notify::ConsoleOutput;
use pagescope::{
    AnalyzeConfig, ChromeDriver, CollectConfig, CollectionSession, Collector, Commands, Config,
    PageDriver, PagescopeError, SetupConfig, Snapshot,
};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Set up logging
    let filter = if config.verbose {
        EnvFilter::new("pagescope=debug,info")
    } else {
        EnvFilter::new("pagescope=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match config.command.clone() {
        Commands::Collect(collect_config) => run_collect(collect_config, config.verbose).await,
        Commands::Analyze(analyze_config) => run_analyze(analyze_config, config.verbose).await,
        Commands::Setup(setup_config) => run_setup(setup_config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

async fn run_collect(collect_config: CollectConfig, verbose: bool) -> Result<(), ExitCode> {
    let target = match normalize_target(&collect_config.target) {
        Ok(t) => t,
        Err(e) => {
            error!("Invalid target: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let settings = match collect_config.settings() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let console = ConsoleOutput::new(verbose, collect_config.json, collect_config.quiet);
    if !collect_config.json {
        print_banner();
    }
    console.print_collect_start(&target, settings.interval);

    let spinner = console.create_spinner("Launching browser...");
    let driver = match ChromeDriver::launch(collect_config.browser.launch_options()).await {
        Ok(d) => d,
        Err(e) => {
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            error!("Failed to launch browser: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    console.print_progress("Browser launched");
    if let Some(ref pb) = spinner {
        pb.set_message(format!("Loading {}...", target));
    }
    let started = CollectionSession::start(driver, &target, settings).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let mut session = match started {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start collection: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let mut updates = session.subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                // Closed channel: the worker has finished on its own.
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    console.print_snapshot(&snapshot);
                    if let Some(ref path) = collect_config.output {
                        if let Err(e) = write_snapshot(path, &snapshot) {
                            warn!("Failed to write {:?}: {}", path, e);
                        }
                    }
                    if let Some(ref path) = collect_config.screenshot {
                        match session.screenshot().await {
                            Ok(png) => {
                                if let Err(e) = std::fs::write(path, png) {
                                    warn!("Failed to write {:?}: {}", path, e);
                                }
                            }
                            Err(e) => warn!("Screenshot failed: {}", e),
                        }
                    }
                }
            }
            _ = &mut shutdown => {
                console.print_info("Stop requested, finishing the current interval...");
                break;
            }
        }
    }

    match session.stop().await {
        Ok(()) => {
            info!("Collection stopped");
            Ok(())
        }
        Err(e) => {
            error!("Collection ended with a browser failure: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

async fn run_analyze(analyze_config: AnalyzeConfig, verbose: bool) -> Result<(), ExitCode> {
    let target = match normalize_target(&analyze_config.target) {
        Ok(t) => t,
        Err(e) => {
            error!("Invalid target: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let console = ConsoleOutput::new(verbose, analyze_config.json, false);

    if !analyze_config.live {
        console.print_guidance(&deep_analysis(&target));
        return Ok(());
    }

    let spinner = console.create_spinner(&format!("Analyzing {}...", target));
    let mut driver = match ChromeDriver::launch(analyze_config.browser.launch_options()).await {
        Ok(d) => d,
        Err(e) => {
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            error!("Failed to launch browser: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let report = match driver.navigate(&target).await {
        Ok(()) => {
            Collector::default()
                .inspect(
                    &mut driver,
                    &target,
                    analyze_config.selector.as_deref(),
                    analyze_config.screenshot.is_some(),
                )
                .await
        }
        Err(e) => Err(e),
    };
    driver.close().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match report {
        Ok(report) => {
            let mut saved = None;
            if let (Some(path), Some(encoded)) =
                (analyze_config.screenshot.as_deref(), report.screenshot.as_deref())
            {
                match write_png(path, encoded) {
                    Ok(()) => saved = Some(path),
                    Err(e) => warn!("Failed to write {:?}: {}", path, e),
                }
            }
            console.print_report(&report, saved);
            Ok(())
        }
        Err(e) => {
            error!("Live analysis failed: {}", e);
            console.print_guidance(&deep_analysis(&target));
            Err(ExitCode::FAILURE)
        }
    }
}

async fn run_setup(setup_config: SetupConfig) -> Result<(), ExitCode> {
    eprintln!("Setting up Chromium browser...");
    match pagescope::browser::download_chrome(setup_config.force).await {
        Ok(path) => {
            eprintln!("Chromium ready at: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Setup failed: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> pagescope::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn write_png(path: &Path, encoded: &str) -> pagescope::Result<()> {
    let png = STANDARD
        .decode(encoded)
        .map_err(|e| PagescopeError::PageAccess(format!("Invalid screenshot data: {}", e)))?;
    std::fs::write(path, png)?;
    Ok(())
}

/// Resolves on SIGTERM/SIGINT (Ctrl-C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                warn!("Failed to register signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn print_banner() {
    println!();
    println!("\x1b[36m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[36m║                    PAGESCOPE v0.1.0                          ║\x1b[0m");
    println!("\x1b[36m║        Page Watcher & Encoding Indicator Scanner             ║\x1b[0m");
    println!("\x1b[36m╚══════════════════════════════════════════════════════════════╝\x1b[0m");
    println!();
}
