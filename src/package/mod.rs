// src/package/mod.rs

//! Package records
//!
//! A `Package` is one known variant of a package: a record parsed from a
//! feed (no destination) or a record installed on a destination. Records
//! live in the package database arena and refer to each other only by
//! `PackageId` or by name, never by reference.

pub mod state;
pub mod version;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use state::{StateFlag, StateStatus, Transition};

/// Stable index of a record in the package database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

/// A single relation entry such as `libc (>= 1.2) | musl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    /// Version constraint (e.g., ">= 1.0.0")
    pub constraint: Option<String>,
    /// Alternatives after the first, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Relation>,
}

impl Relation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
            alternatives: Vec::new(),
        }
    }

    /// Parse a single relation group
    /// Format: "package (>= 1.0)" or "package" or "a | b (= 2)"
    pub fn parse(group: &str) -> Option<Self> {
        let mut alts = group.split('|').filter_map(parse_single);
        let mut first = alts.next()?;
        first.alternatives = alts.collect();
        Some(first)
    }

    /// Parse a comma separated relation field
    pub fn parse_list(field: &str) -> Vec<Self> {
        field.split(',').filter_map(Relation::parse).collect()
    }

    /// All names this relation can be satisfied by
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.alternatives.iter().map(|a| a.name.as_str()))
    }
}

fn parse_single(dep: &str) -> Option<Relation> {
    let dep = dep.trim();
    if dep.is_empty() {
        return None;
    }

    if let Some(paren_pos) = dep.find('(') {
        let name = dep[..paren_pos].trim().to_string();
        let constraint = dep[paren_pos + 1..].trim_end_matches(')').trim().to_string();
        Some(Relation {
            name,
            constraint: (!constraint.is_empty()).then_some(constraint),
            alternatives: Vec::new(),
        })
    } else {
        Some(Relation::new(dep))
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(c) = &self.constraint {
            write!(f, " ({})", c)?;
        }
        for alt in &self.alternatives {
            write!(f, " | {}", alt)?;
        }
        Ok(())
    }
}

/// Which relation list a reverse query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Depends,
    Recommends,
    Provides,
    Conflicts,
    Replaces,
}

/// Relation lists of a package, stored as JSON in the status database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default)]
    pub depends: Vec<Relation>,
    #[serde(default)]
    pub recommends: Vec<Relation>,
    #[serde(default)]
    pub suggests: Vec<Relation>,
    #[serde(default)]
    pub conflicts: Vec<Relation>,
    #[serde(default)]
    pub provides: Vec<Relation>,
    #[serde(default)]
    pub replaces: Vec<Relation>,
}

impl Relations {
    pub fn of_kind(&self, kind: RelationKind) -> &[Relation] {
        match kind {
            RelationKind::Depends => &self.depends,
            RelationKind::Recommends => &self.recommends,
            RelationKind::Provides => &self.provides,
            RelationKind::Conflicts => &self.conflicts,
            RelationKind::Replaces => &self.replaces,
        }
    }
}

/// One known package variant
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub section: Option<String>,
    pub relations: Relations,

    /// Archive path relative to the source base
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub essential: bool,

    /// Installed file list
    pub files: Vec<String>,

    pub state_status: StateStatus,
    pub state_flag: StateFlag,
    /// Feed record this installed record was created from
    pub parent: Option<PackageId>,

    /// Destination name; `None` for records that only come from a feed
    pub dest: Option<String>,
    /// Source (feed) name
    pub src: Option<String>,
    /// Unix time of the last successful configuration
    pub installed_time: Option<i64>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Installed-family record on some destination
    pub fn is_installed(&self) -> bool {
        self.dest.is_some() && self.state_status.is_installed_family()
    }

    /// Same name, version and architecture
    pub fn same_unit(&self, other: &Package) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.architecture == other.architecture
    }

    /// Does this package satisfy a dependency on `name`, directly or by provides?
    pub fn provides_name(&self, name: &str) -> bool {
        self.name == name || self.relations.provides.iter().any(|p| p.name == name)
    }

    /// Human-readable identifier
    pub fn label(&self) -> String {
        match &self.architecture {
            Some(arch) => format!("{}_{}_{}", self.name, self.version, arch),
            None => format!("{}_{}", self.name, self.version),
        }
    }
}

/// Snapshot handed to list callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub installed: bool,
}

impl From<&Package> for PackageSummary {
    fn from(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            architecture: pkg.architecture.clone(),
            description: pkg.description.clone(),
            tags: pkg.tags.clone(),
            installed: pkg.state_status == StateStatus::Installed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relation() {
        let rel = Relation::parse("libc6 (>= 2.34)").unwrap();
        assert_eq!(rel.name, "libc6");
        assert_eq!(rel.constraint.as_deref(), Some(">= 2.34"));

        let bare = Relation::parse("bash").unwrap();
        assert_eq!(bare.name, "bash");
        assert!(bare.constraint.is_none());
    }

    #[test]
    fn test_parse_relation_list_with_alternatives() {
        let rels = Relation::parse_list("package-a | package-b (= 2), other-package, ");
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].names().collect::<Vec<_>>(), vec!["package-a", "package-b"]);
        assert_eq!(rels[0].alternatives[0].constraint.as_deref(), Some("= 2"));
        assert_eq!(rels[1].name, "other-package");
        assert_eq!(rels[0].to_string(), "package-a | package-b (= 2)");
    }

    #[test]
    fn test_installed_requires_destination() {
        let mut pkg = Package::new("foo", "1.0");
        pkg.state_status = StateStatus::Installed;
        assert!(!pkg.is_installed());

        pkg.dest = Some("root".to_string());
        assert!(pkg.is_installed());
    }

    #[test]
    fn test_provides_name() {
        let mut pkg = Package::new("busybox", "1.36");
        pkg.relations.provides = Relation::parse_list("sh, coreutils");
        assert!(pkg.provides_name("busybox"));
        assert!(pkg.provides_name("sh"));
        assert!(!pkg.provides_name("bash"));
    }

    #[test]
    fn test_summary_marks_installed_only_when_configured() {
        let mut pkg = Package::new("foo", "1.0");
        pkg.state_status = StateStatus::Unpacked;
        assert!(!PackageSummary::from(&pkg).installed);

        pkg.state_status = StateStatus::Installed;
        assert!(PackageSummary::from(&pkg).installed);
    }
}
