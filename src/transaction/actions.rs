// src/transaction/actions.rs

//! Package actions delegated by the transaction engine
//!
//! The engine owns ordering, progress, state transitions on configure and
//! remove, and status persistence. Choosing candidates and unpacking,
//! configuring, removing or upgrading a package is delegated to a
//! `PackageActions` implementation.

use crate::config::Config;
use crate::database::PackageDatabase;
use crate::error::{Error, Result};
use crate::package::version::{compare_versions, satisfies};
use crate::package::{PackageId, Relation, StateFlag, StateStatus, Transition};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Collaborator steps of install, remove and upgrade
pub trait PackageActions {
    /// Turn an install request (a name, an archive path or URL) into a package name
    fn prepare_url(&mut self, config: &Config, db: &mut PackageDatabase, request: &str)
    -> Result<String>;

    /// Consistency check before any change
    fn preinstall_check(&mut self, config: &Config, db: &PackageDatabase) -> Result<()>;

    /// Unpack the single best provider of `name` (and its dependencies)
    fn install_by_name(&mut self, config: &Config, db: &mut PackageDatabase, name: &str)
    -> Result<()>;

    /// Unpack every provider of `name`
    fn install_multi_by_name(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        name: &str,
    ) -> Result<()>;

    /// Run configuration of an unpacked package
    fn configure(&mut self, config: &Config, db: &PackageDatabase, id: PackageId) -> Result<()>;

    /// Remove an installed package's contents
    fn remove(
        &mut self,
        config: &Config,
        db: &PackageDatabase,
        id: PackageId,
        purge: bool,
    ) -> Result<()>;

    /// Replace an installed package with its newest candidate
    fn upgrade(&mut self, config: &Config, db: &mut PackageDatabase, id: PackageId) -> Result<()>;
}

/// State-only actions: records move through their lifecycle but no files
/// are laid down and no scripts run
#[derive(Debug, Default)]
pub struct BookkeepingActions;

impl BookkeepingActions {
    pub fn new() -> Self {
        Self
    }

    /// Feed record to install for `name`: exact name first, then providers
    fn select_candidate(&self, db: &PackageDatabase, name: &str) -> Result<PackageId> {
        if let Some(id) = db.best_candidate(name) {
            return Ok(id);
        }

        let providers = db.fetch_providers(name);
        let preferred = providers
            .iter()
            .copied()
            .find(|id| db.get(*id).state_flag.contains(StateFlag::PREFER));
        match preferred.or_else(|| providers.first().copied()) {
            Some(id) => {
                if providers.len() > 1 {
                    info!(
                        "{} is provided by {} packages, using {}",
                        name,
                        providers.len(),
                        db.get(id).label()
                    );
                }
                Ok(id)
            }
            None => Err(Error::NotFoundError(format!("package '{}'", name))),
        }
    }

    /// Is `rel` satisfied by something installed on `dest`?
    fn satisfied(db: &PackageDatabase, rel: &Relation, dest: &str) -> bool {
        std::iter::once(rel).chain(rel.alternatives.iter()).any(|alt| {
            db.fetch_all_installed().into_iter().any(|id| {
                let pkg = db.get(id);
                pkg.dest.as_deref() == Some(dest)
                    && pkg.provides_name(&alt.name)
                    && (pkg.name != alt.name
                        || alt.constraint.as_deref().is_none_or(|c| satisfies(&pkg.version, c)))
            })
        })
    }

    fn install_dependencies(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        candidate: PackageId,
        dest: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<()> {
        let depends = db.get(candidate).relations.depends.clone();
        let label = db.get(candidate).label();

        for rel in depends {
            if Self::satisfied(db, &rel, dest) {
                continue;
            }

            let mut last_err = None;
            let mut installed = false;
            for alt in rel.names() {
                match self.install_into(config, db, alt, dest, visiting) {
                    Ok(()) => {
                        installed = true;
                        break;
                    }
                    Err(e) => last_err = Some(e),
                }
            }

            if !installed {
                let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
                if config.flags.force_depends {
                    warn!("{} depends on {} which cannot be installed: {}", label, rel, reason);
                } else {
                    return Err(Error::ConflictError(format!(
                        "{} depends on {}: {}",
                        label, rel, reason
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_conflicts(db: &PackageDatabase, candidate: PackageId, dest: &str) -> Result<()> {
        let pkg = db.get(candidate);
        for rel in &pkg.relations.conflicts {
            if Self::satisfied(db, rel, dest) {
                return Err(Error::ConflictError(format!(
                    "{} conflicts with installed {}",
                    pkg.label(),
                    rel
                )));
            }
        }
        Ok(())
    }

    /// Clone a feed record into `dest` and move it to unpacked
    fn unpack(db: &mut PackageDatabase, candidate: PackageId, dest: &str) -> Result<PackageId> {
        let mut pkg = db.get(candidate).clone();
        pkg.dest = Some(dest.to_string());
        pkg.parent = Some(candidate);
        pkg.state_status = StateStatus::NotInstalled;
        pkg.state_flag |= StateFlag::PREFER | StateFlag::FILELIST_CHANGED;
        pkg.installed_time = None;

        let id = db.insert(pkg)?;
        db.apply(id, Transition::Unpack)?;
        debug!("Unpacked {} into {}", db.get(id).label(), dest);
        Ok(id)
    }

    fn install_into(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        name: &str,
        dest: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<()> {
        if let Some(id) = db.fetch_installed_by_name_dest(name, dest) {
            if !config.flags.force_reinstall || visiting.contains(name) {
                info!("{} is already installed on {}", db.get(id).label(), dest);
                return Ok(());
            }
            info!("Reinstalling {} on {}", db.get(id).label(), dest);
            db.mark_removed(id)?;
        }

        // `visiting` holds the names on the current resolution path only; a
        // name seen again on that path is a cycle that resolves once its
        // first member is unpacked
        if !visiting.insert(name.to_string()) {
            return Ok(());
        }
        let result = self.resolve_and_unpack(config, db, name, dest, visiting);
        visiting.remove(name);
        result
    }

    fn resolve_and_unpack(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        name: &str,
        dest: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<()> {
        let candidate = self.select_candidate(db, name)?;
        if !config.flags.nodeps {
            self.install_dependencies(config, db, candidate, dest, visiting)?;
        }
        Self::check_conflicts(db, candidate, dest)?;
        Self::unpack(db, candidate, dest)?;
        Ok(())
    }
}

impl PackageActions for BookkeepingActions {
    fn prepare_url(
        &mut self,
        _config: &Config,
        db: &mut PackageDatabase,
        request: &str,
    ) -> Result<String> {
        let is_archive = request.contains("://") || request.ends_with(".ipk");
        if !is_archive {
            return Ok(request.to_string());
        }

        // name_version_arch.ipk
        let file = request.rsplit('/').next().unwrap_or(request);
        let stem = file.strip_suffix(".ipk").unwrap_or(file);
        let name = stem.split('_').next().unwrap_or(stem);
        if name.is_empty() || db.fetch_by_name(name).is_empty() {
            return Err(Error::NotFoundError(format!("package archive '{}'", request)));
        }

        debug!("Resolved {} to package {}", request, name);
        Ok(name.to_string())
    }

    fn preinstall_check(&mut self, _config: &Config, db: &PackageDatabase) -> Result<()> {
        for id in db.fetch_all_installed() {
            let pkg = db.get(id);
            if pkg.state_flag.contains(StateFlag::REINSTREQ) {
                warn!("{} needs to be reinstalled", pkg.label());
            }
        }
        Ok(())
    }

    fn install_by_name(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        name: &str,
    ) -> Result<()> {
        let dest = config.registry.default_destination().name.clone();
        self.install_into(config, db, name, &dest, &mut HashSet::new())?;

        if let Some(id) = db.fetch_installed_by_name_dest(name, &dest) {
            db.get_mut(id).state_flag.insert(StateFlag::USER);
        }
        Ok(())
    }

    fn install_multi_by_name(
        &mut self,
        config: &Config,
        db: &mut PackageDatabase,
        name: &str,
    ) -> Result<()> {
        let mut names: Vec<String> = Vec::new();
        for id in db.fetch_providers(name) {
            let provider = &db.get(id).name;
            if !names.contains(provider) {
                names.push(provider.clone());
            }
        }
        if names.is_empty() {
            return Err(Error::NotFoundError(format!("package '{}'", name)));
        }

        for provider in names {
            self.install_by_name(config, db, &provider)?;
        }
        Ok(())
    }

    fn configure(&mut self, _config: &Config, db: &PackageDatabase, id: PackageId) -> Result<()> {
        debug!("Configuring {}", db.get(id).label());
        Ok(())
    }

    fn remove(
        &mut self,
        config: &Config,
        db: &PackageDatabase,
        id: PackageId,
        purge: bool,
    ) -> Result<()> {
        let pkg = db.get(id);

        if pkg.essential && !config.flags.force_removal_of_essential_packages {
            return Err(Error::ConflictError(format!(
                "{} is essential; refusing to remove it",
                pkg.label()
            )));
        }

        let dependents: Vec<String> = db
            .fetch_all_installed()
            .into_iter()
            .filter(|other| *other != id)
            .map(|other| db.get(other))
            .filter(|other| other.dest == pkg.dest)
            .filter(|other| {
                other
                    .relations
                    .depends
                    .iter()
                    .flat_map(|rel| rel.names())
                    .any(|dep| pkg.provides_name(dep))
            })
            .map(|other| other.name.clone())
            .collect();

        if !dependents.is_empty() {
            if config.flags.force_removal_of_dependent_packages {
                warn!("Removing {} although {} depend on it", pkg.name, dependents.join(", "));
            } else {
                return Err(Error::ConflictError(format!(
                    "{} is needed by {}",
                    pkg.name,
                    dependents.join(", ")
                )));
            }
        }

        debug!("Removing {}{}", pkg.label(), if purge { " (purge)" } else { "" });
        Ok(())
    }

    fn upgrade(&mut self, config: &Config, db: &mut PackageDatabase, id: PackageId) -> Result<()> {
        let installed = db.get(id);
        let (name, version) = (installed.name.clone(), installed.version.clone());
        let dest = installed
            .dest
            .clone()
            .ok_or_else(|| Error::NotInstalled(name.clone()))?;

        if installed.state_flag.contains(StateFlag::HOLD) {
            info!("{} is held, not upgrading", name);
            return Ok(());
        }

        let Some(candidate) = db.best_candidate(&name) else {
            debug!("No candidate for {}", name);
            return Ok(());
        };

        match compare_versions(&db.get(candidate).version, &version) {
            Ordering::Equal if !config.flags.force_reinstall => {
                debug!("{} is up to date", name);
                return Ok(());
            }
            Ordering::Less if !config.flags.force_downgrade => {
                debug!("Not downgrading {} to {}", name, db.get(candidate).version);
                return Ok(());
            }
            _ => {}
        }

        let old_status = db.get(id).state_status;
        let old_parent = db.get(id).parent;
        let was_user = db.get(id).state_flag.contains(StateFlag::USER);
        db.apply(id, Transition::Remove)?;

        if let Err(e) = self.install_into(config, db, &name, &dest, &mut HashSet::new()) {
            db.get_mut(id).state_status = old_status;
            return Err(e);
        }

        if let Some(parent) = old_parent {
            db.get_mut(parent).state_status = StateStatus::NotInstalled;
        }
        if let Some(new_id) = db.fetch_installed_by_name_dest(&name, &dest) {
            if was_user {
                db.get_mut(new_id).state_flag.insert(StateFlag::USER);
            }
            info!("Upgrading {} from {} to {}", name, version, db.get(new_id).version);
        }
        Ok(())
    }
}
