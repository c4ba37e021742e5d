// src/repository/sync.rs

//! Package list synchronization
//!
//! Every configured source is fetched in order, one at a time, into the
//! lists directory. A source that fails to download or inflate is
//! recorded in the report and does not stop the sources after it; only an
//! unusable lists directory aborts the whole run.

use super::{Transport, decompress};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::{Progress, ProgressSink, Span};
use crate::registry::Source;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Keyring used when `signature_keyring` is not configured
pub const DEFAULT_KEYRING: &str = "/etc/sprig/keys";

/// Result of checking a list's detached signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Verified,
    /// Signature fetched but did not verify
    Failed(String),
    /// No signature could be fetched
    Unavailable,
    /// Checking disabled, not compiled in, or the list itself failed
    Skipped,
}

/// What happened to one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source: String,
    pub url: String,
    /// Download or inflate failure, if any
    pub error: Option<String>,
    pub signature: SignatureStatus,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-source results of one synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl SyncReport {
    /// Every source was fetched
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(SourceOutcome::is_ok)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

fn prepare_lists_dir(lists_dir: &Path) -> Result<()> {
    let display = || lists_dir.display().to_string();

    if lists_dir.exists() && !lists_dir.is_dir() {
        return Err(Error::ListsDirError(display(), "not a directory".to_string()));
    }
    fs::create_dir_all(lists_dir).map_err(|e| Error::ListsDirError(display(), e.to_string()))
}

/// Fetch one source's list into `list_path`
fn fetch_list(
    transport: &dyn Transport,
    source: &Source,
    list_path: &Path,
    work_dir: &Path,
    on_bytes: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    let url = source.list_url();
    if !source.gzip {
        return transport.download(&url, list_path, Some(on_bytes));
    }

    let compressed = work_dir.join(format!("{}.gz", source.name));
    let result = transport
        .download(&url, &compressed, Some(on_bytes))
        .and_then(|_| decompress::gunzip(&compressed, list_path).map(|_| ()));
    let _ = fs::remove_file(&compressed);
    result
}

#[cfg(feature = "signature")]
fn check_signature(
    config: &Config,
    transport: &dyn Transport,
    source: &Source,
    list_path: &Path,
    work_dir: &Path,
) -> SignatureStatus {
    use super::gpg::SignatureVerifier;

    if !config.flags.check_signature {
        return SignatureStatus::Skipped;
    }

    let sig_path = work_dir.join(format!("{}.sig", source.name));
    if let Err(e) = transport.download(&source.signature_url(), &sig_path, None) {
        warn!("Signature for {} unavailable: {}", source.name, e);
        return SignatureStatus::Unavailable;
    }

    let keyring = config
        .flags
        .signature_keyring
        .as_deref()
        .unwrap_or(DEFAULT_KEYRING);
    let result = SignatureVerifier::from_keyring(Path::new(keyring))
        .and_then(|verifier| verifier.verify_file(list_path, &sig_path));
    let _ = fs::remove_file(&sig_path);

    match result {
        Ok(()) => {
            info!("Signature check passed for {}", source.name);
            SignatureStatus::Verified
        }
        Err(e) => {
            warn!("Signature check failed for {}: {}", source.name, e);
            SignatureStatus::Failed(e.to_string())
        }
    }
}

#[cfg(not(feature = "signature"))]
fn check_signature(
    config: &Config,
    _transport: &dyn Transport,
    source: &Source,
    _list_path: &Path,
    _work_dir: &Path,
) -> SignatureStatus {
    if config.flags.check_signature {
        debug!("Signature support not built, not checking {}", source.name);
    }
    SignatureStatus::Skipped
}

/// Synchronize the package list of every configured source
pub fn update_lists(
    config: &Config,
    transport: &dyn Transport,
    sink: Option<&mut dyn ProgressSink>,
) -> Result<SyncReport> {
    let lists_dir = config.registry.effective_lists_dir();
    prepare_lists_dir(lists_dir)?;

    fs::create_dir_all(&config.tmp_dir)?;
    let work_dir = tempfile::Builder::new()
        .prefix("sprig-update-")
        .tempdir_in(&config.tmp_dir)
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to create temporary directory in {}: {}",
                config.tmp_dir.display(),
                e
            ))
        })?;

    let mut progress = Progress::new(sink);
    progress.report(0);

    let sources = config.registry.sources();
    let mut report = SyncReport::default();

    for (done, source) in sources.iter().enumerate() {
        let span = Span::step(done, sources.len());
        let list_path = lists_dir.join(&source.name);
        debug!("Updating {} from {}", source.name, source.list_url());

        let mut on_bytes = |total: u64, now: u64| progress.report_within(span, now, total);
        let fetched = fetch_list(transport, source, &list_path, work_dir.path(), &mut on_bytes);

        let outcome = match fetched {
            Ok(()) => {
                info!("Updated list of {}", source.name);
                SourceOutcome {
                    source: source.name.clone(),
                    url: source.list_url(),
                    error: None,
                    signature: check_signature(config, transport, source, &list_path, work_dir.path()),
                }
            }
            Err(e) => {
                warn!("Failed to update list of {}: {}", source.name, e);
                SourceOutcome {
                    source: source.name.clone(),
                    url: source.list_url(),
                    error: Some(e.to_string()),
                    signature: SignatureStatus::Skipped,
                }
            }
        };
        report.outcomes.push(outcome);
        progress.report(span.finish);
    }

    progress.finish();

    if let Err(e) = work_dir.close() {
        warn!("Failed to remove temporary directory: {}", e);
    }

    if !report.is_success() {
        warn!(
            "{} of {} sources failed to update",
            report.failed_count(),
            sources.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Destination, Registry};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Serves lists from memory, failing any URL listed in `broken`
    struct FakeTransport {
        broken: Vec<String>,
        requested: RefCell<Vec<String>>,
    }

    impl Transport for FakeTransport {
        fn download(
            &self,
            url: &str,
            dest: &Path,
            progress: Option<&mut dyn FnMut(u64, u64)>,
        ) -> Result<()> {
            self.requested.borrow_mut().push(url.to_string());
            if self.broken.iter().any(|b| url.contains(b.as_str())) || url.ends_with(".sig") {
                return Err(Error::DownloadError(format!("HTTP 404 from {}", url)));
            }
            if let Some(progress) = progress {
                for now in [0, 250, 500, 750, 1000] {
                    progress(1000, now);
                }
            }
            fs::write(dest, format!("Package: from-{}\nVersion: 1.0\n", url))?;
            Ok(())
        }
    }

    fn config_with_sources(dir: &TempDir, names: &[&str]) -> Config {
        let mut registry = Registry::new(
            dir.path().join("lists"),
            vec![Destination::new("root", dir.path().join("root"))],
        )
        .unwrap();
        for name in names {
            registry
                .add_source(Source::new(*name, format!("http://feeds/{}", name), false))
                .unwrap();
        }
        let mut config = Config::new(registry);
        config.tmp_dir = dir.path().join("tmp");
        config.flags.check_signature = false;
        config
    }

    #[test]
    fn test_partial_failure_keeps_going() {
        let dir = TempDir::new().unwrap();
        let config = config_with_sources(&dir, &["one", "two", "three"]);
        let transport = FakeTransport {
            broken: vec!["feeds/two".to_string()],
            requested: RefCell::new(Vec::new()),
        };

        let report = update_lists(&config, &transport, None).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed().next().unwrap().source, "two");
        assert!(dir.path().join("lists/one").exists());
        assert!(!dir.path().join("lists/two").exists());
        assert!(dir.path().join("lists/three").exists());
        assert_eq!(transport.requested.borrow().len(), 3);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let dir = TempDir::new().unwrap();
        let config = config_with_sources(&dir, &["one", "two", "three"]);
        let transport = FakeTransport {
            broken: Vec::new(),
            requested: RefCell::new(Vec::new()),
        };

        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        update_lists(&config, &transport, Some(&mut sink)).unwrap();

        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lists_dir_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let config = config_with_sources(&dir, &["one"]);
        fs::write(dir.path().join("lists"), b"file in the way").unwrap();

        let transport = FakeTransport {
            broken: Vec::new(),
            requested: RefCell::new(Vec::new()),
        };
        let result = update_lists(&config, &transport, None);
        assert!(matches!(result, Err(Error::ListsDirError(_, _))));
        assert!(transport.requested.borrow().is_empty());
    }

    #[test]
    fn test_temp_dir_is_removed() {
        let dir = TempDir::new().unwrap();
        let config = config_with_sources(&dir, &["one"]);
        let transport = FakeTransport {
            broken: Vec::new(),
            requested: RefCell::new(Vec::new()),
        };

        update_lists(&config, &transport, None).unwrap();
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[cfg(feature = "signature")]
    #[test]
    fn test_missing_signature_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_sources(&dir, &["one"]);
        config.flags = crate::config::Flags::default();
        let transport = FakeTransport {
            broken: Vec::new(),
            requested: RefCell::new(Vec::new()),
        };

        let report = update_lists(&config, &transport, None).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes[0].signature, SignatureStatus::Unavailable);
        assert_eq!(
            *transport.requested.borrow(),
            vec!["http://feeds/one/Packages", "http://feeds/one/Packages.sig"]
        );
    }

    #[test]
    fn test_signature_opt_out_skips_fetch() {
        let dir = TempDir::new().unwrap();
        let config = config_with_sources(&dir, &["one"]);
        let transport = FakeTransport {
            broken: Vec::new(),
            requested: RefCell::new(Vec::new()),
        };

        let report = update_lists(&config, &transport, None).unwrap();
        assert_eq!(report.outcomes[0].signature, SignatureStatus::Skipped);
        assert!(!transport.requested.borrow().iter().any(|u| u.ends_with(".sig")));
    }
}
