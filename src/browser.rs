//! Managed Chromium install: locate or download the browser the driver launches.

use crate::types::{PagescopeError, Result};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// File names the fetcher (or a system install) uses for the browser binary.
const EXECUTABLE_NAMES: &[&str] = &[
    "chrome",
    "chromium",
    "Chromium",
    "Google Chrome",
    "chrome.exe",
    "chromium.exe",
];

/// Returns the managed Chrome installation directory: `~/.pagescope/chrome/`
pub fn managed_chrome_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagescopeError::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(".pagescope").join("chrome"))
}

/// A previously downloaded Chrome executable, if any.
pub fn resolve_chrome_executable() -> Option<PathBuf> {
    find_chrome_in_dir(&managed_chrome_dir().ok()?)
}

/// Download Chromium to the managed directory.
/// Returns the path to the downloaded executable.
pub async fn download_chrome(force: bool) -> Result<PathBuf> {
    let chrome_dir = managed_chrome_dir()?;

    if !force {
        if let Some(exe) = find_chrome_in_dir(&chrome_dir) {
            info!("Chrome already installed at {:?}", exe);
            return Ok(exe);
        }
    }

    if force && chrome_dir.exists() {
        info!("Removing existing Chrome installation for re-download...");
        tokio::fs::remove_dir_all(&chrome_dir).await?;
    }

    tokio::fs::create_dir_all(&chrome_dir).await?;

    info!("Downloading Chromium to {:?}...", chrome_dir);

    let options = BrowserFetcherOptions::builder()
        .with_path(&chrome_dir)
        .build()
        .map_err(|e| {
            PagescopeError::Config(format!("Failed to configure browser fetcher: {}", e))
        })?;

    let installed = BrowserFetcher::new(options)
        .fetch()
        .await
        .map_err(|e| PagescopeError::Config(format!("Failed to download Chromium: {}", e)))?;

    info!("Chromium downloaded to {:?}", installed.executable_path);
    Ok(installed.executable_path)
}

/// Depth-first search of `dir` for a Chrome/Chromium executable.
fn find_chrome_in_dir(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        // macOS app bundle
        if name == "Chromium.app" {
            let inner = path.join("Contents/MacOS/Chromium");
            if inner.is_file() {
                return Some(inner);
            }
            continue;
        }

        if path.is_dir() {
            subdirs.push(path);
        } else if EXECUTABLE_NAMES.contains(&name.as_str()) {
            return Some(path);
        }
    }

    subdirs.iter().find_map(|d| find_chrome_in_dir(d))
}
