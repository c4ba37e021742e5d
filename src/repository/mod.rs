// src/repository/mod.rs

//! Package feeds and downloading
//!
//! This module provides functionality for:
//! - Fetching files from remote (HTTP) or local (`file://`) feeds
//! - Synchronizing package lists from every configured source
//! - Loading package lists into the package database
//! - Verifying archive checksums and list signatures

pub mod decompress;
pub mod feed;
#[cfg(feature = "signature")]
pub mod gpg;
pub mod sync;

pub use feed::{load_feeds, parse_packages};
pub use sync::{SignatureStatus, SourceOutcome, SyncReport, update_lists};

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

const CHUNK_SIZE: usize = 64 * 1024;

/// Fetches a URL into a local file
///
/// `progress` receives `(total, now)` byte counts; `total` is 0 when the
/// size is unknown. On success `dest` holds the complete content; a failed
/// download never leaves a partial file at `dest`.
pub trait Transport {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<()>;
}

/// Sibling path used while a file is being written
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Move a finished temp file into place
pub(crate) fn finish_partial(temp_path: &Path, dest: &Path) -> Result<()> {
    fs::rename(temp_path, dest).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            temp_path.display(),
            dest.display(),
            e
        ))
    })
}

fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
        })?;
    }
    Ok(())
}

/// Copy `reader` into `writer`, reporting progress per chunk
fn stream_with_progress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    progress: &mut dyn FnMut(u64, u64),
) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut now = 0u64;
    progress(total, 0);
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        now += n as u64;
        progress(total, now);
    }
    writer.flush()?;
    Ok(now)
}

/// Local path behind a `file://` URL or an absolute path
fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Path::new(path));
    }
    url.starts_with('/').then(|| Path::new(url))
}

/// HTTP client wrapper with retry support and local feed access
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
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn copy_local(
        &self,
        src: &Path,
        dest: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let mut input = File::open(src)
            .map_err(|e| Error::DownloadError(format!("Cannot open {}: {}", src.display(), e)))?;
        let total = input.metadata().map(|m| m.len()).unwrap_or(0);

        let temp_path = partial_path(dest);
        let mut file = File::create(&temp_path).map_err(|e| {
            Error::IoError(format!("Failed to create file {}: {}", temp_path.display(), e))
        })?;

        if let Err(e) = stream_with_progress(&mut input, &mut file, total, progress) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::DownloadError(format!(
                "Failed to copy {}: {}",
                src.display(),
                e
            )));
        }

        finish_partial(&temp_path, dest)
    }

    fn fetch_http(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let total = response.content_length().unwrap_or(0);

                    // Write to temporary file first
                    let temp_path = partial_path(dest);
                    let mut file = File::create(&temp_path).map_err(|e| {
                        Error::IoError(format!(
                            "Failed to create file {}: {}",
                            temp_path.display(),
                            e
                        ))
                    })?;

                    match stream_with_progress(&mut response, &mut file, total, progress) {
                        Ok(bytes) => {
                            debug!("Downloaded {} bytes from {}", bytes, url);
                            return finish_partial(&temp_path, dest);
                        }
                        Err(e) => {
                            let _ = fs::remove_file(&temp_path);
                            if attempt >= self.max_retries {
                                return Err(Error::DownloadError(format!(
                                    "Failed to download {} after {} attempts: {}",
                                    url, attempt, e
                                )));
                            }
                            warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                        }
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                }
            }
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
        }
    }
}

impl Transport for RepositoryClient {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());
        ensure_parent(dest)?;

        let mut ignore = |_: u64, _: u64| {};
        let progress: &mut dyn FnMut(u64, u64) = match progress {
            Some(progress) => progress,
            None => &mut ignore,
        };

        match local_path(url) {
            Some(src) => self.copy_local(src, dest, progress),
            None => self.fetch_http(url, dest, progress),
        }
    }
}

/// Verify file checksum matches expected value
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open file for checksum: {}", e)))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::IoError(format!("Failed to read file for checksum: {}", e)))?;

    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}

/// Download a package archive into `dest_dir`, verifying it when a
/// checksum is known
pub fn download_package(
    transport: &dyn Transport,
    url: &str,
    dest_dir: &Path,
    sha256: Option<&str>,
) -> Result<PathBuf> {
    let filename = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::DownloadError(format!("No file name in URL {}", url)))?;

    let dest_path = dest_dir.join(filename);
    transport.download(url, &dest_path, None)?;

    if let Some(expected) = sha256 {
        if let Err(e) = verify_checksum(&dest_path, expected) {
            let _ = fs::remove_file(&dest_path);
            return Err(e);
        }
    }

    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/lists/base")),
            PathBuf::from("/lists/base.tmp")
        );
        assert_eq!(
            partial_path(Path::new("/cache/foo_1.0_armv7.ipk")),
            PathBuf::from("/cache/foo_1.0_armv7.ipk.tmp")
        );
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(local_path("file:///srv/feed/Packages"), Some(Path::new("/srv/feed/Packages")));
        assert_eq!(local_path("/srv/feed/Packages"), Some(Path::new("/srv/feed/Packages")));
        assert_eq!(local_path("http://example.com/Packages"), None);
    }

    #[test]
    fn test_local_download_reports_progress() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Packages");
        fs::write(&src, vec![b'x'; 100_000]).unwrap();

        let dest = dir.path().join("lists").join("base");
        let mut seen = Vec::new();
        let mut progress = |total: u64, now: u64| seen.push((total, now));

        let client = RepositoryClient::new().unwrap();
        client
            .download(&format!("file://{}", src.display()), &dest, Some(&mut progress))
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap().len(), 100_000);
        assert!(!partial_path(&dest).exists());
        assert_eq!(seen.first(), Some(&(100_000, 0)));
        assert_eq!(seen.last(), Some(&(100_000, 100_000)));
    }

    #[test]
    fn test_missing_local_file_is_download_error() {
        let dir = TempDir::new().unwrap();
        let client = RepositoryClient::new().unwrap();
        let result = client.download(
            &format!("file://{}/missing", dir.path().display()),
            &dir.path().join("out"),
            None,
        );
        assert!(matches!(result, Err(Error::DownloadError(_))));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_verify_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.ipk");
        fs::write(&path, b"package body").unwrap();
        let good = format!("{:x}", Sha256::digest(b"package body"));

        assert!(verify_checksum(&path, &good).is_ok());
        assert!(verify_checksum(&path, &good.to_uppercase()).is_ok());
        assert!(matches!(
            verify_checksum(&path, "deadbeef"),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_download_package_removes_bad_archive() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("feed");
        fs::create_dir_all(&feed).unwrap();
        fs::write(feed.join("foo_1.0_all.ipk"), b"archive").unwrap();

        let client = RepositoryClient::new().unwrap();
        let url = format!("file://{}/foo_1.0_all.ipk", feed.display());
        let cache = dir.path().join("cache");

        let result = download_package(&client, &url, &cache, Some("00"));
        assert!(result.is_err());
        assert!(!cache.join("foo_1.0_all.ipk").exists());

        let sum = format!("{:x}", Sha256::digest(b"archive"));
        let path = download_package(&client, &url, &cache, Some(&sum)).unwrap();
        assert_eq!(path, cache.join("foo_1.0_all.ipk"));
    }
}
