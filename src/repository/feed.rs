// src/repository/feed.rs

//! Package list parsing
//!
//! Package lists use the RFC 822-like control format (key: value pairs,
//! one stanza per package, stanzas separated by blank lines).

use crate::config::Config;
use crate::database::PackageDatabase;
use crate::error::{Error, Result};
use crate::package::{Package, Relation};
use serde::Deserialize;
use std::fs;
use tracing::{debug, info, warn};

/// One stanza of a package list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FeedEntry {
    package: String,
    version: String,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    depends: Option<String>,
    #[serde(default)]
    recommends: Option<String>,
    #[serde(default)]
    suggests: Option<String>,
    #[serde(default)]
    conflicts: Option<String>,
    #[serde(default)]
    provides: Option<String>,
    #[serde(default)]
    replaces: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "SHA256", default)]
    sha256: Option<String>,
    #[serde(default)]
    essential: Option<String>,
}

fn relations(field: Option<&str>) -> Vec<Relation> {
    field.map(Relation::parse_list).unwrap_or_default()
}

impl FeedEntry {
    fn into_package(self, source: &str) -> Package {
        let mut pkg = Package::new(self.package, self.version);
        pkg.relations.depends = relations(self.depends.as_deref());
        pkg.relations.recommends = relations(self.recommends.as_deref());
        pkg.relations.suggests = relations(self.suggests.as_deref());
        pkg.relations.conflicts = relations(self.conflicts.as_deref());
        pkg.relations.provides = relations(self.provides.as_deref());
        pkg.relations.replaces = relations(self.replaces.as_deref());
        pkg.architecture = self.architecture;
        pkg.description = self.description;
        pkg.tags = self.tags;
        pkg.section = self.section;
        pkg.filename = self.filename;
        pkg.size = self.size.and_then(|s| s.trim().parse().ok());
        pkg.sha256 = self.sha256;
        pkg.essential = self
            .essential
            .is_some_and(|e| e.trim().eq_ignore_ascii_case("yes"));
        pkg.src = Some(source.to_string());
        pkg
    }
}

/// Parse a package list into feed records tagged with `source`
pub fn parse_packages(content: &str, source: &str) -> Result<Vec<Package>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<FeedEntry> = rfc822_like::from_str(content)
        .map_err(|e| Error::ParseError(format!("Failed to parse package list {}: {}", source, e)))?;

    debug!("Parsed {} package entries from {}", entries.len(), source);
    Ok(entries.into_iter().map(|e| e.into_package(source)).collect())
}

/// Load the cached list of every configured source
///
/// A missing list (never synchronized) is skipped; an unreadable or
/// malformed one is logged and skipped. Returns the number of records
/// loaded.
pub fn load_feeds(config: &Config, db: &mut PackageDatabase) -> Result<usize> {
    let lists_dir = config.registry.effective_lists_dir();
    let mut count = 0;

    for source in config.registry.sources() {
        let path = lists_dir.join(&source.name);
        if !path.exists() {
            debug!("No cached list for {} at {}", source.name, path.display());
            continue;
        }

        let packages = match fs::read_to_string(&path)
            .map_err(Error::from)
            .and_then(|content| parse_packages(&content, &source.name))
        {
            Ok(packages) => packages,
            Err(e) => {
                warn!("Skipping list of {}: {}", source.name, e);
                continue;
            }
        };

        for pkg in packages {
            db.insert(pkg)?;
            count += 1;
        }
    }

    info!("Loaded {} feed records", count);
    Ok(count)
}
