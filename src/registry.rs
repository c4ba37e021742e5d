// src/registry.rs

//! Install destinations and package sources

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Status directory of a destination, relative to its root
pub const STATUS_SUBDIR: &str = "var/lib/sprig";

/// Name of the uncompressed package list on a feed
pub const PACKAGES_FILE: &str = "Packages";

/// An install root with its own status, lists and info directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub name: String,
    pub root_dir: PathBuf,
    pub status_dir: PathBuf,
    pub lists_dir: PathBuf,
    pub info_dir: PathBuf,
}

impl Destination {
    pub fn new(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let status_dir = root_dir.join(STATUS_SUBDIR);
        Self {
            name: name.into(),
            lists_dir: status_dir.join("lists"),
            info_dir: status_dir.join("info"),
            status_dir,
            root_dir,
        }
    }

    /// SQLite status database of this destination
    pub fn status_db_path(&self) -> PathBuf {
        self.status_dir.join("status.db")
    }
}

/// A remote or local feed of package metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    /// Base URL or path
    pub value: String,
    /// Extra path segment for "distribution/component" layouts
    pub extra_data: Option<String>,
    /// Feed is served as Packages.gz
    pub gzip: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, value: impl Into<String>, gzip: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            extra_data: None,
            gzip,
        }
    }

    fn base(&self) -> String {
        let value = self.value.trim_end_matches('/');
        match &self.extra_data {
            Some(extra) => format!("{}/{}", value, extra.trim_matches('/')),
            None => value.to_string(),
        }
    }

    /// URL of the package list
    pub fn list_url(&self) -> String {
        let file = if self.gzip {
            format!("{}.gz", PACKAGES_FILE)
        } else {
            PACKAGES_FILE.to_string()
        };
        format!("{}/{}", self.base(), file)
    }

    /// URL of the detached signature of the package list
    pub fn signature_url(&self) -> String {
        format!("{}/{}.sig", self.base(), PACKAGES_FILE)
    }

    /// URL of a package archive listed by this source
    pub fn archive_url(&self, filename: &str) -> String {
        format!("{}/{}", self.value.trim_end_matches('/'), filename.trim_start_matches('/'))
    }
}

/// Destinations and sources known to one configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    destinations: Vec<Destination>,
    sources: Vec<Source>,
    default_dest: usize,
    lists_dir: PathBuf,
    pub restrict_to_default_dest: bool,
}

impl Registry {
    /// Create a registry; the first destination is the default
    pub fn new(lists_dir: impl Into<PathBuf>, destinations: Vec<Destination>) -> Result<Self> {
        if destinations.is_empty() {
            return Err(Error::ConfigError("no destinations configured".to_string()));
        }

        for (i, dest) in destinations.iter().enumerate() {
            if destinations[..i].iter().any(|d| d.name == dest.name) {
                return Err(Error::ConfigError(format!(
                    "destination '{}' defined twice",
                    dest.name
                )));
            }
        }

        Ok(Self {
            destinations,
            sources: Vec::new(),
            default_dest: 0,
            lists_dir: lists_dir.into(),
            restrict_to_default_dest: false,
        })
    }

    pub fn add_source(&mut self, source: Source) -> Result<()> {
        if self.sources.iter().any(|s| s.name == source.name) {
            return Err(Error::ConfigError(format!(
                "source '{}' defined twice",
                source.name
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn set_default_destination(&mut self, name: &str) -> Result<()> {
        self.default_dest = self
            .destinations
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| Error::NotFoundError(format!("destination '{}'", name)))?;
        Ok(())
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn destination(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn default_destination(&self) -> &Destination {
        &self.destinations[self.default_dest]
    }

    /// Lists directory used by list synchronization and feed loading
    pub fn effective_lists_dir(&self) -> &Path {
        if self.restrict_to_default_dest {
            &self.default_destination().lists_dir
        } else {
            &self.lists_dir
        }
    }

    /// Destination name queries must be scoped to, if any
    pub fn scoped_dest(&self) -> Option<&str> {
        self.restrict_to_default_dest
            .then(|| self.default_destination().name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_layout() {
        let dest = Destination::new("root", "/mnt/target");
        assert_eq!(dest.status_dir, PathBuf::from("/mnt/target/var/lib/sprig"));
        assert_eq!(dest.lists_dir, PathBuf::from("/mnt/target/var/lib/sprig/lists"));
        assert_eq!(dest.info_dir, PathBuf::from("/mnt/target/var/lib/sprig/info"));
        assert_eq!(
            dest.status_db_path(),
            PathBuf::from("/mnt/target/var/lib/sprig/status.db")
        );
    }

    #[test]
    fn test_source_urls() {
        let plain = Source::new("base", "http://feeds.example.com/armv7/", false);
        assert_eq!(plain.list_url(), "http://feeds.example.com/armv7/Packages");
        assert_eq!(plain.signature_url(), "http://feeds.example.com/armv7/Packages.sig");

        let mut debian = Source::new("main", "http://feeds.example.com", true);
        debian.extra_data = Some("stable/main".to_string());
        assert_eq!(debian.list_url(), "http://feeds.example.com/stable/main/Packages.gz");
        assert_eq!(
            debian.signature_url(),
            "http://feeds.example.com/stable/main/Packages.sig"
        );
        assert_eq!(
            debian.archive_url("pool/foo_1.0_armv7.ipk"),
            "http://feeds.example.com/pool/foo_1.0_armv7.ipk"
        );
    }

    #[test]
    fn test_default_destination_scoping() {
        let mut reg = Registry::new(
            "/var/lib/sprig/lists",
            vec![Destination::new("root", "/"), Destination::new("ram", "/tmp/ram")],
        )
        .unwrap();

        assert_eq!(reg.default_destination().name, "root");
        assert_eq!(reg.scoped_dest(), None);
        assert_eq!(reg.effective_lists_dir(), Path::new("/var/lib/sprig/lists"));

        reg.set_default_destination("ram").unwrap();
        reg.restrict_to_default_dest = true;
        assert_eq!(reg.scoped_dest(), Some("ram"));
        assert_eq!(
            reg.effective_lists_dir(),
            Path::new("/tmp/ram/var/lib/sprig/lists")
        );

        assert!(reg.set_default_destination("missing").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        assert!(
            Registry::new(
                "/lists",
                vec![Destination::new("root", "/"), Destination::new("root", "/b")]
            )
            .is_err()
        );
        assert!(Registry::new("/lists", Vec::new()).is_err());

        let mut reg = Registry::new("/lists", vec![Destination::new("root", "/")]).unwrap();
        reg.add_source(Source::new("base", "http://a", false)).unwrap();
        assert!(reg.add_source(Source::new("base", "http://b", false)).is_err());
    }
}
