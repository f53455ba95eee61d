// src/repository/mod.rs

//! Repository transport and manifest handling
//!
//! This module provides:
//! - A blocking HTTP client with retry support for manifest and
//!   control-file downloads
//! - The `distributions` manifest (branch name -> Release subpath)
//! - `Release` manifest parsing (declared md5sum list)
//! - The path contract that selects `Packages.gz` checksum entries

pub mod cache;

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP client wrapper with retry support
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch a text resource with retry support
    pub fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    return response
                        .text()
                        .map_err(|e| Error::Download(format!("Failed to read response: {}", e)));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download a file to the specified path with retry support
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    // Write to temporary file first
                    let temp_path = dest_path.with_extension("tmp");
                    let mut file = File::create(&temp_path)?;
                    io::copy(&mut response, &mut file)
                        .map_err(|e| Error::Download(format!("Failed to write download: {}", e)))?;

                    // Atomic rename from temp to final destination
                    fs::rename(&temp_path, dest_path)?;

                    debug!("Downloaded to {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

/// Join a repository root and a relative path with exactly one slash
pub fn join_url(root: &str, path: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// One declared branch: (branch name, Release subpath)
pub type Distribution = (String, String);

/// Parse the `distributions` manifest: whitespace-separated lines of
/// `<branch-name> <release-subpath>`
///
/// Blank lines and `#` comments are skipped; any other malformed line is
/// a configuration error.
pub fn parse_distributions(content: &str) -> Result<Vec<Distribution>> {
    let mut branches = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(branch), Some(release_path)) => {
                branches.push((branch.to_string(), release_path.to_string()));
            }
            _ => {
                return Err(Error::Config(format!(
                    "Malformed distributions line: '{}'",
                    line
                )));
            }
        }
    }
    Ok(branches)
}

/// Fetch and parse the distributions manifest at `<repo_root>/distributions`
///
/// An unreadable manifest is irrecoverable and propagates.
pub fn read_distributions(
    client: &RepositoryClient,
    repository_root: &str,
) -> Result<Vec<Distribution>> {
    let content = client
        .fetch_text(&join_url(repository_root, "distributions"))
        .map_err(|e| Error::Config(format!("Cannot read distributions manifest: {}", e)))?;
    parse_distributions(&content)
}

/// Raw `Release` control file, parsed for its checksum list
#[derive(Debug, Deserialize)]
struct ReleaseFields {
    #[serde(rename = "MD5Sum", default)]
    md5sum: Option<String>,
}

/// One entry of a Release manifest's checksum list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub md5sum: String,
    pub size: u64,
    pub path: String,
}

/// A branch's `Release` manifest
#[derive(Debug)]
pub struct ReleaseManifest {
    pub checksums: Vec<ChecksumEntry>,
}

impl ReleaseManifest {
    /// Parse a Release control file, extracting its `MD5Sum` entries
    pub fn parse(content: &str) -> Result<Self> {
        let fields: ReleaseFields = rfc822_like::from_str(content)
            .map_err(|e| Error::Parse(format!("Failed to parse Release manifest: {}", e)))?;

        let mut checksums = Vec::new();
        if let Some(list) = fields.md5sum {
            for line in list.lines() {
                let mut parts = line.split_whitespace();
                if let (Some(md5sum), Some(size), Some(path)) =
                    (parts.next(), parts.next(), parts.next())
                {
                    let size = size.parse().map_err(|_| {
                        Error::Parse(format!("Invalid size in Release entry: '{}'", line))
                    })?;
                    checksums.push(ChecksumEntry {
                        md5sum: md5sum.to_string(),
                        size,
                        path: path.to_string(),
                    });
                }
            }
        }

        Ok(Self { checksums })
    }
}

/// The path contract for package-list checksum entries
///
/// Matches `<component>/<token>-<arch>/Packages.gz` (component may carry
/// a hyphenated suffix, e.g. `main-updates`) and yields the component
/// and the bare architecture. Any other path is ignored.
pub fn parse_packages_path(path: &str) -> Option<(String, String)> {
    let mut segments = path.split('/');
    let component = segments.next()?;
    let arch_segment = segments.next()?;
    let file = segments.next()?;

    if segments.next().is_some() || file != "Packages.gz" || component.is_empty() {
        return None;
    }

    let (token, arch) = arch_segment.split_once('-')?;
    if token.is_empty() || arch.is_empty() {
        return None;
    }

    Some((component.to_string(), arch.to_string()))
}

/// Compute the md5 checksum of a file as a lowercase hex string
pub fn md5_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
