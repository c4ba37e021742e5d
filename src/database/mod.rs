// src/database/mod.rs

//! In-memory package database
//!
//! Records are kept in an arena indexed by `PackageId` with a name index on
//! the side. Several versions, architectures and destinations of the same
//! name coexist; within one destination at most one record per name may
//! be in the installed family (installed, unpacked, half-configured).

use crate::error::{Error, Result};
use crate::package::{Package, PackageId, RelationKind, StateFlag, StateStatus, Transition};
use crate::package::version::compare_versions;
use glob::Pattern;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Compile a shell-style name pattern
pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::ParseError(format!("Invalid pattern '{}': {}", pattern, e)))
}

/// Package records and their name index
#[derive(Debug, Default, Clone)]
pub struct PackageDatabase {
    packages: Vec<Package>,
    by_name: HashMap<String, Vec<PackageId>>,
}

impl PackageDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub fn get_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    /// All ids in arena (load) order
    pub fn ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        (0..self.packages.len()).map(PackageId)
    }

    /// Insert a record, replacing an existing record of the same identity
    ///
    /// Identity is name, version, architecture and destination. A replaced
    /// record keeps its id.
    pub fn insert(&mut self, pkg: Package) -> Result<PackageId> {
        let existing = self.fetch_by_name(&pkg.name).iter().copied().find(|id| {
            let other = self.get(*id);
            other.same_unit(&pkg) && other.dest == pkg.dest
        });

        if pkg.is_installed() {
            self.check_single_installed(&pkg.name, pkg.dest.as_deref(), existing)?;
        }

        match existing {
            Some(id) => {
                let parent = self.packages[id.0].parent;
                self.packages[id.0] = pkg;
                if self.packages[id.0].parent.is_none() {
                    self.packages[id.0].parent = parent;
                }
                debug!("Replaced package record {}", self.get(id).label());
                Ok(id)
            }
            None => {
                let id = PackageId(self.packages.len());
                self.by_name.entry(pkg.name.clone()).or_default().push(id);
                self.packages.push(pkg);
                Ok(id)
            }
        }
    }

    fn check_single_installed(
        &self,
        name: &str,
        dest: Option<&str>,
        except: Option<PackageId>,
    ) -> Result<()> {
        let clash = self
            .fetch_by_name(name)
            .iter()
            .copied()
            .filter(|id| Some(*id) != except)
            .map(|id| self.get(id))
            .find(|other| other.is_installed() && other.dest.as_deref() == dest);

        match clash {
            Some(other) => Err(Error::ConflictError(format!(
                "{} is already {} on destination {}",
                other.label(),
                other.state_status,
                dest.unwrap_or("-")
            ))),
            None => Ok(()),
        }
    }

    /// Move a record through the state machine
    pub fn apply(&mut self, id: PackageId, transition: Transition) -> Result<StateStatus> {
        let pkg = self.get(id);
        let next = pkg
            .state_status
            .apply(transition)
            .ok_or_else(|| Error::InvalidTransition {
                package: pkg.label(),
                from: pkg.state_status,
                transition,
            })?;

        if next.is_installed_family() && pkg.dest.is_some() && !pkg.is_installed() {
            self.check_single_installed(&pkg.name, pkg.dest.as_deref(), Some(id))?;
        }

        self.get_mut(id).state_status = next;
        Ok(next)
    }

    /// Record a successful configuration: installed, no longer preferred,
    /// mirrored onto the parent record
    pub fn mark_configured(&mut self, id: PackageId, when: i64) -> Result<()> {
        self.apply(id, Transition::Configure)?;

        let pkg = self.get_mut(id);
        pkg.state_flag.remove(StateFlag::PREFER);
        pkg.installed_time = Some(when);

        if let Some(parent) = pkg.parent {
            let parent = self.get_mut(parent);
            parent.state_status = StateStatus::Installed;
            parent.state_flag.remove(StateFlag::PREFER);
        }
        Ok(())
    }

    /// Record a successful removal on the record and its parent
    pub fn mark_removed(&mut self, id: PackageId) -> Result<()> {
        self.apply(id, Transition::Remove)?;

        // Another destination may still hold the same unit
        if let Some(parent) = self.get(id).parent {
            let still_held = self
                .fetch_all_installed()
                .into_iter()
                .any(|other| self.get(other).parent == Some(parent));
            if !still_held {
                self.get_mut(parent).state_status = StateStatus::NotInstalled;
            }
        }
        Ok(())
    }

    /// Every record with this exact name
    pub fn fetch_by_name(&self, name: &str) -> &[PackageId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every known record, optionally filtered by a shell-style name pattern
    pub fn fetch_available(&self, pattern: Option<&str>) -> Result<Vec<PackageId>> {
        let pattern = pattern.map(compile_pattern).transpose()?;
        Ok(self
            .ids()
            .filter(|id| match &pattern {
                Some(p) => p.matches(&self.get(*id).name),
                None => true,
            })
            .collect())
    }

    /// Every installed-family record on any destination
    ///
    /// Feed records mirroring an installed status are not included.
    pub fn fetch_all_installed(&self) -> Vec<PackageId> {
        self.ids()
            .filter(|id| {
                let pkg = self.get(*id);
                pkg.dest.is_some() && pkg.is_installed()
            })
            .collect()
    }

    /// First installed record with this name on any destination
    pub fn fetch_installed_by_name(&self, name: &str) -> Option<PackageId> {
        self.fetch_by_name(name).iter().copied().find(|id| {
            let pkg = self.get(*id);
            pkg.dest.is_some() && pkg.is_installed()
        })
    }

    /// Installed record with this name on one destination
    pub fn fetch_installed_by_name_dest(&self, name: &str, dest: &str) -> Option<PackageId> {
        self.fetch_by_name(name).iter().copied().find(|id| {
            let pkg = self.get(*id);
            pkg.is_installed() && pkg.dest.as_deref() == Some(dest)
        })
    }

    /// Installed lookup, scoped to `dest` when given
    pub fn fetch_installed(&self, name: &str, dest: Option<&str>) -> Option<PackageId> {
        match dest {
            Some(dest) => self.fetch_installed_by_name_dest(name, dest),
            None => self.fetch_installed_by_name(name),
        }
    }

    /// Feed records that can satisfy `name`, directly or through provides
    pub fn fetch_providers(&self, name: &str) -> Vec<PackageId> {
        self.ids()
            .filter(|id| {
                let pkg = self.get(*id);
                pkg.dest.is_none() && pkg.provides_name(name)
            })
            .collect()
    }

    /// Best feed candidate for an exact name: preferred first, then newest
    pub fn best_candidate(&self, name: &str) -> Option<PackageId> {
        self.fetch_by_name(name)
            .iter()
            .copied()
            .filter(|id| self.get(*id).dest.is_none())
            .max_by(|a, b| self.candidate_order(*a, *b))
    }

    fn candidate_order(&self, a: PackageId, b: PackageId) -> Ordering {
        let (pa, pb) = (self.get(a), self.get(b));
        let prefer = |p: &Package| p.state_flag.contains(StateFlag::PREFER);
        prefer(pa)
            .cmp(&prefer(pb))
            .then_with(|| compare_versions(&pa.version, &pb.version))
            .then_with(|| b.cmp(&a))
    }

    /// Drop every feed record, keeping installed records without their
    /// parent links
    ///
    /// Returns the number of records dropped. Ids of kept records change.
    pub fn drop_feeds(&mut self) -> usize {
        let before = self.packages.len();
        let kept: Vec<Package> = std::mem::take(&mut self.packages)
            .into_iter()
            .filter(|pkg| pkg.dest.is_some())
            .map(|mut pkg| {
                pkg.parent = None;
                pkg
            })
            .collect();

        self.by_name.clear();
        for (index, pkg) in kept.iter().enumerate() {
            self.by_name
                .entry(pkg.name.clone())
                .or_default()
                .push(PackageId(index));
        }
        self.packages = kept;
        before - self.packages.len()
    }

    /// Connect installed records to the feed record describing them
    pub fn link_parents(&mut self) -> usize {
        let mut linked = 0;
        for id in self.ids().collect::<Vec<_>>() {
            let pkg = self.get(id);
            if pkg.dest.is_none() {
                continue;
            }
            if let Some(parent) = pkg.parent {
                // Reloaded feed records lose the mirrored status
                let status = pkg.state_status;
                self.get_mut(parent).state_status = status;
                continue;
            }

            let parent = self.fetch_by_name(&pkg.name).iter().copied().find(|other| {
                let other = self.get(*other);
                other.dest.is_none() && other.same_unit(pkg)
            });

            if let Some(parent) = parent {
                let status = pkg.state_status;
                self.get_mut(id).parent = Some(parent);
                self.get_mut(parent).state_status = status;
                linked += 1;
            }
        }
        linked
    }

    /// Packages whose relation list of `kind` names something matching `pattern`
    pub fn what(&self, kind: RelationKind, pattern: &str) -> Result<Vec<PackageId>> {
        let pattern = compile_pattern(pattern)?;
        Ok(self
            .ids()
            .filter(|id| {
                self.get(*id)
                    .relations
                    .of_kind(kind)
                    .iter()
                    .any(|rel| rel.names().any(|n| pattern.matches(n)))
            })
            .collect())
    }

    /// Installed packages owning a file matching `pattern`
    pub fn search_file(&self, pattern: &str) -> Result<Vec<(PackageId, String)>> {
        let pattern = compile_pattern(pattern)?;
        let mut hits = Vec::new();
        for id in self.fetch_all_installed() {
            for file in &self.get(id).files {
                if pattern.matches(file) {
                    hits.push((id, file.clone()));
                }
            }
        }
        Ok(hits)
    }
}
