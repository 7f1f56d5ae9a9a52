//! APK downloads from F-Droid and direct URLs.
//!
//! [`Downloader`] is the seam the workflow depends on; [`download_app`] wraps
//! any downloader with the download event protocol. [`ApkDownloader`] is the
//! HTTP implementation.
//!
//! F-Droid apps are resolved through the repository's `index-v2.json`, which
//! is fetched once per downloader. The latest `versionCode` of a package
//! wins, and its SHA-256 is checked after download.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{AppDefinition, AppSource};
use crate::events::{Event, EventKind, EventPayload, EventSink};

pub const FDROID_REPO_URL: &str = "https://f-droid.org/repo";
pub const FDROID_INDEX_URL: &str = "https://f-droid.org/repo/index-v2.json";

const CHUNK_SIZE: usize = 8192;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INDEX_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a single download failed. Never fatal to a run.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error for {url}: {details}")]
    Http { url: String, details: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("F-Droid index error: {0}")]
    Index(String),

    #[error("No {0} locator specified")]
    MissingLocator(AppSource),

    #[error("Package '{0}' not found in F-Droid index")]
    NotInIndex(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// A progress tick for one download.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub url: &'a str,
    pub downloaded: u64,
    /// Total size when the server or index reports one
    pub total: Option<u64>,
}

/// Fetches an app's APK to a local file.
pub trait Downloader {
    /// Download `app`, reporting progress through `progress`.
    fn fetch(
        &mut self,
        app: &AppDefinition,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<PathBuf, DownloadError>;
}

fn download_event(
    kind: EventKind,
    message: String,
    app: &AppDefinition,
    progress: Option<Progress<'_>>,
) -> Event {
    let (url, progress_bytes, total_bytes) = match progress {
        Some(p) => (p.url.to_string(), p.downloaded, p.total.unwrap_or(0)),
        None => (String::new(), 0, 0),
    };
    let progress_percent = if total_bytes > 0 {
        progress_bytes as f64 / total_bytes as f64 * 100.0
    } else {
        0.0
    };
    Event::new(
        kind,
        message,
        EventPayload::Download {
            app_id: app.id.clone(),
            app_name: app.name.clone(),
            source: app.source.to_string(),
            url,
            progress_bytes,
            total_bytes,
            progress_percent,
        },
    )
}

/// Download one app with start/progress/complete/fail events.
///
/// Returns the local path, or `None` when the download failed. Progress
/// events are only emitted when the total size is known.
pub fn download_app(
    downloader: &mut dyn Downloader,
    app: &AppDefinition,
    sink: &mut dyn EventSink,
) -> Option<PathBuf> {
    sink.emit(download_event(
        EventKind::DownloadStarted,
        format!("Starting download: {}", app.name),
        app,
        None,
    ));

    let result = downloader.fetch(app, &mut |p| {
        if let Some(total) = p.total.filter(|t| *t > 0) {
            let percent = p.downloaded as f64 / total as f64 * 100.0;
            sink.emit(download_event(
                EventKind::DownloadProgress,
                format!("Downloading {}: {:.1}%", app.name, percent),
                app,
                Some(p),
            ));
        }
    });

    match result {
        Ok(path) => {
            sink.emit(download_event(
                EventKind::DownloadCompleted,
                format!("Downloaded: {}", app.name),
                app,
                None,
            ));
            Some(path)
        }
        Err(e) => {
            warn!("Download of {} failed: {}", app.id, e);
            sink.emit(download_event(
                EventKind::DownloadFailed,
                format!("Failed to download {}: {}", app.name, e),
                app,
                None,
            ));
            None
        }
    }
}

/// Latest version of one F-Droid package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdroidPackage {
    pub version_name: String,
    pub version_code: i64,
    /// Path relative to the repository root
    pub apk_name: String,
    pub sha256: String,
    pub size: u64,
}

impl FdroidPackage {
    pub fn download_url(&self) -> String {
        format!("{}/{}", FDROID_REPO_URL, self.apk_name)
    }
}

fn version_code(version: &Value) -> i64 {
    version
        .pointer("/manifest/versionCode")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Reduce a parsed `index-v2.json` to the latest version of each package.
///
/// Packages without versions or without file info are dropped. The index
/// stores `sha256` either as a string or as a list of strings.
pub fn parse_fdroid_index(index: &Value) -> HashMap<String, FdroidPackage> {
    let mut packages = HashMap::new();
    let Some(entries) = index.get("packages").and_then(Value::as_object) else {
        return packages;
    };

    for (name, entry) in entries {
        let Some(versions) = entry.get("versions").and_then(Value::as_object) else {
            continue;
        };
        let Some(latest) = versions.values().max_by_key(|v| version_code(v)) else {
            continue;
        };
        let Some(file) = latest.get("file").and_then(Value::as_object) else {
            continue;
        };
        if file.is_empty() {
            continue;
        }

        let sha256 = match file.get("sha256") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(list)) => list
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        packages.insert(
            name.clone(),
            FdroidPackage {
                version_name: latest
                    .pointer("/manifest/versionName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                version_code: version_code(latest),
                apk_name: file
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                sha256,
                size: file.get("size").and_then(Value::as_u64).unwrap_or(0),
            },
        );
    }

    packages
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Check `path` against `expected`, deleting the file on mismatch.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), DownloadError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    if let Err(e) = fs::remove_file(path) {
        debug!("Could not delete {}: {}", path.display(), e);
    }
    Err(DownloadError::ChecksumMismatch {
        expected: expected.to_string(),
        actual,
    })
}

/// HTTP downloader backed by a blocking `reqwest` client.
///
/// The client and the download directory are set up on first use, so
/// construction cannot fail.
pub struct ApkDownloader {
    download_dir: PathBuf,
    client: Option<reqwest::blocking::Client>,
    index: Option<HashMap<String, FdroidPackage>>,
}

impl ApkDownloader {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            client: None,
            index: None,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn client(&mut self) -> Result<reqwest::blocking::Client, DownloadError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| DownloadError::Http {
                url: String::new(),
                details: e.to_string(),
            })?;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn fdroid_package(&mut self, package_name: &str) -> Result<FdroidPackage, DownloadError> {
        if self.index.is_none() {
            info!("Fetching F-Droid index");
            let index: Value = self
                .client()?
                .get(FDROID_INDEX_URL)
                .timeout(INDEX_TIMEOUT)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .and_then(reqwest::blocking::Response::json)
                .map_err(|e| DownloadError::Index(e.to_string()))?;
            let packages = parse_fdroid_index(&index);
            debug!("F-Droid index: {} packages", packages.len());
            self.index = Some(packages);
        }
        self.index
            .as_ref()
            .and_then(|index| index.get(package_name))
            .cloned()
            .ok_or_else(|| DownloadError::NotInIndex(package_name.to_string()))
    }

    /// Stream `url` into `dest`, removing the partial file on any failure.
    fn download_file(
        &mut self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<(), DownloadError> {
        let result = self.stream_to(url, dest, expected_size, progress);
        if result.is_err() {
            if let Err(e) = fs::remove_file(dest) {
                debug!("Could not delete partial {}: {}", dest.display(), e);
            }
        }
        result
    }

    fn stream_to(
        &mut self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<(), DownloadError> {
        let http_err = |e: reqwest::Error| DownloadError::Http {
            url: url.to_string(),
            details: e.to_string(),
        };

        let mut response = self
            .client()?
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(http_err)?;

        let total = response
            .content_length()
            .filter(|len| *len > 0)
            .or((expected_size > 0).then_some(expected_size));

        let mut file = File::create(dest)?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut downloaded = 0u64;
        loop {
            let n = response.read(&mut buf).map_err(|e| DownloadError::Http {
                url: url.to_string(),
                details: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            downloaded += n as u64;
            progress(Progress {
                url,
                downloaded,
                total,
            });
        }
        file.flush()?;
        Ok(())
    }
}

impl Downloader for ApkDownloader {
    fn fetch(
        &mut self,
        app: &AppDefinition,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<PathBuf, DownloadError> {
        let locator = app
            .locator()
            .ok_or(DownloadError::MissingLocator(app.source))?
            .to_string();
        fs::create_dir_all(&self.download_dir)?;
        let dest = self.download_dir.join(format!("{}.apk", app.id));

        match app.source {
            AppSource::Fdroid => {
                let package = self.fdroid_package(&locator)?;
                let url = package.download_url();
                debug!("{} -> {} ({})", app.id, url, package.version_name);
                self.download_file(&url, &dest, package.size, progress)?;
                if !package.sha256.is_empty() {
                    verify_checksum(&dest, &package.sha256)?;
                }
            }
            AppSource::Direct => {
                self.download_file(&locator, &dest, 0, progress)?;
            }
        }

        info!("Downloaded {} to {}", app.id, dest.display());
        Ok(dest)
    }
}
