// src/transaction/mod.rs

//! Transaction engine
//!
//! A `Session` binds one configuration to one package database and runs
//! install, remove, upgrade and configure operations against it, one at a
//! time, on the caller's thread. Every mutating operation ends by writing
//! the status of every destination.

pub mod actions;

pub use actions::{BookkeepingActions, PackageActions};

use crate::config::{Config, OptionValue};
use crate::database::{PackageDatabase, compile_pattern};
use crate::error::{Error, Result};
use crate::package::{Package, PackageId, PackageSummary, RelationKind, StateStatus, Transition};
use crate::progress::{Progress, ProgressSink};
use crate::repository::{self, RepositoryClient, SyncReport, Transport};
use crate::status;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Build the package database for `config`: feeds, then installed status
fn build_database(config: &Config) -> Result<PackageDatabase> {
    let mut db = PackageDatabase::new();
    repository::load_feeds(config, &mut db)?;
    for dest in config.registry.destinations() {
        status::load_status(dest, &mut db)?;
    }
    let linked = db.link_parents();
    debug!("Linked {} installed records to feed records", linked);
    Ok(db)
}

/// Records shown by listings: feed records, plus installed records no
/// feed describes
fn is_listed(pkg: &Package) -> bool {
    pkg.dest.is_none() || pkg.parent.is_none()
}

/// One engine session over a configuration
pub struct Session {
    config: Config,
    db: PackageDatabase,
    actions: Box<dyn PackageActions>,
    transport: Box<dyn Transport>,
}

impl Session {
    /// Open a session with the bookkeeping actions and the network client
    pub fn open(config: Config) -> Result<Self> {
        let transport = RepositoryClient::new()?;
        Self::with_parts(config, Box::new(BookkeepingActions::new()), Box::new(transport))
    }

    /// Open a session with explicit collaborators
    pub fn with_parts(
        config: Config,
        actions: Box<dyn PackageActions>,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let db = build_database(&config)?;
        info!(
            "Session opened: {} records, {} destinations, {} sources",
            db.len(),
            config.registry.destinations().len(),
            config.registry.sources().len()
        );
        Ok(Self {
            config,
            db,
            actions,
            transport,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &PackageDatabase {
        &self.db
    }

    fn write_status(&mut self) -> Result<()> {
        status::write_status_files(&self.config, &mut self.db)
    }

    /// Persist whatever was done before `err`, then hand `err` back
    fn fail_after_partial(&mut self, err: Error) -> Error {
        if let Err(e) = self.write_status() {
            warn!("Failed to write status after error: {}", e);
        }
        err
    }

    fn installed(&self, name: &str) -> Result<PackageId> {
        self.db
            .fetch_installed(name, self.config.registry.scoped_dest())
            .ok_or_else(|| Error::NotInstalled(name.to_string()))
    }

    /// Configure every unpacked package whose name matches `pattern`
    ///
    /// Failures do not stop the batch; the first one is returned at the end.
    pub fn configure_packages(&mut self, pattern: Option<&str>) -> Result<()> {
        let pattern = pattern.map(compile_pattern).transpose()?;
        let mut first_err = None;

        let ids: Vec<PackageId> = self.db.ids().collect();
        for id in ids {
            let pkg = self.db.get(id);
            if pkg.dest.is_none() || pkg.state_status != StateStatus::Unpacked {
                continue;
            }
            if pattern.as_ref().is_some_and(|p| !p.matches(&pkg.name)) {
                continue;
            }

            let result = match self.actions.configure(&self.config, &self.db, id) {
                Ok(()) => self
                    .db
                    .mark_configured(id, chrono::Utc::now().timestamp()),
                Err(e) => {
                    warn!("Failed to configure {}: {}", self.db.get(id).label(), e);
                    self.db.apply(id, Transition::ConfigureFailed).map(|_| ())?;
                    Err(e)
                }
            };

            match result {
                Ok(()) => info!("Configured {}", self.db.get(id).label()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Install `name` and everything it needs
    pub fn install_package(
        &mut self,
        name: &str,
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<()> {
        let mut progress = Progress::new(sink);
        progress.report(0);

        let name = self.actions.prepare_url(&self.config, &mut self.db, name)?;
        progress.report(50);

        self.actions.preinstall_check(&self.config, &self.db)?;

        let installed = if self.config.flags.multiple_providers {
            self.actions
                .install_multi_by_name(&self.config, &mut self.db, &name)
        } else {
            self.actions.install_by_name(&self.config, &mut self.db, &name)
        };
        if let Err(e) = installed {
            return Err(self.fail_after_partial(e));
        }
        progress.report(75);

        if let Err(e) = self.configure_packages(None) {
            return Err(self.fail_after_partial(e));
        }

        self.write_status()?;
        progress.finish();
        info!("Installed {}", name);
        Ok(())
    }

    /// Remove the installed package `name`
    pub fn remove_package(
        &mut self,
        name: &str,
        purge: bool,
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<()> {
        let mut progress = Progress::new(sink);
        progress.report(0);

        self.actions.preinstall_check(&self.config, &self.db)?;

        let found = self.installed(name)?;
        progress.report(25);

        // Act on the copy of the destination the lookup landed on
        let dest = self
            .db
            .get(found)
            .dest
            .clone()
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        let id = self
            .db
            .fetch_installed_by_name_dest(name, &dest)
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        progress.report(75);

        self.actions.remove(&self.config, &self.db, id, purge)?;
        self.db.mark_removed(id)?;
        if purge {
            self.db.get_mut(id).files.clear();
        }

        self.write_status()?;
        progress.finish();
        info!("Removed {} from {}", name, dest);
        Ok(())
    }

    /// Upgrade the installed package `name` to its newest candidate
    pub fn upgrade_package(
        &mut self,
        name: &str,
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<()> {
        let mut progress = Progress::new(sink);
        progress.report(0);

        self.actions.preinstall_check(&self.config, &self.db)?;

        let id = self.installed(name)?;
        progress.report(25);

        self.actions.upgrade(&self.config, &mut self.db, id)?;
        progress.report(75);

        if let Err(e) = self.configure_packages(None) {
            return Err(self.fail_after_partial(e));
        }

        self.write_status()?;
        progress.finish();
        Ok(())
    }

    /// Upgrade every installed package
    ///
    /// Individual failures do not stop the batch. Configuration runs once
    /// after the whole batch.
    pub fn upgrade_all(&mut self, sink: Option<&mut dyn ProgressSink>) -> Result<()> {
        let mut progress = Progress::new(sink);
        progress.report(0);

        self.actions.preinstall_check(&self.config, &self.db)?;

        let scoped = self.config.registry.scoped_dest().map(str::to_string);
        let ids: Vec<PackageId> = self
            .db
            .fetch_all_installed()
            .into_iter()
            .filter(|id| scoped.is_none() || self.db.get(*id).dest == scoped)
            .collect();

        let total = ids.len();
        let mut failed = 0;
        for (i, id) in ids.into_iter().enumerate() {
            let label = self.db.get(id).label();
            if let Err(e) = self.actions.upgrade(&self.config, &mut self.db, id) {
                warn!("Failed to upgrade {}: {}", label, e);
                failed += 1;
            }
            progress.report((100 * i / total) as u32);
        }

        let configured = self.configure_packages(None);
        self.write_status()?;

        if failed > 0 {
            return Err(Error::UpgradeFailed { failed, total });
        }
        configured?;
        progress.finish();
        Ok(())
    }

    /// Refresh the package lists of every source, then load them
    pub fn update_package_lists(
        &mut self,
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<SyncReport> {
        let report = repository::update_lists(&self.config, self.transport.as_ref(), sink)?;

        // Versions a source no longer carries must stop being candidates
        let dropped = self.db.drop_feeds();
        debug!("Dropped {} feed records before reloading lists", dropped);
        repository::load_feeds(&self.config, &mut self.db)?;
        self.db.link_parents();
        Ok(report)
    }

    /// Fetch the archive of the best candidate for `name` into `dir`
    pub fn download_package(&self, name: &str, dir: &Path) -> Result<PathBuf> {
        let id = self
            .db
            .best_candidate(name)
            .ok_or_else(|| Error::NotFoundError(format!("package '{}'", name)))?;
        let pkg = self.db.get(id);

        let filename = pkg
            .filename
            .as_deref()
            .ok_or_else(|| Error::NotFoundError(format!("archive of {}", pkg.label())))?;
        let source = pkg
            .src
            .as_deref()
            .and_then(|src| self.config.registry.source(src))
            .ok_or_else(|| Error::NotFoundError(format!("source of {}", pkg.label())))?;

        repository::download_package(
            self.transport.as_ref(),
            &source.archive_url(filename),
            dir,
            pkg.sha256.as_deref(),
        )
    }

    /// Known packages, optionally filtered by a shell-style pattern
    pub fn list_packages(
        &self,
        pattern: Option<&str>,
        mut cb: impl FnMut(&PackageSummary),
    ) -> Result<()> {
        for id in self.db.fetch_available(pattern)? {
            let pkg = self.db.get(id);
            if is_listed(pkg) {
                cb(&PackageSummary::from(pkg));
            }
        }
        Ok(())
    }

    /// Installed packages on every (or the restricted) destination
    pub fn list_installed(&self, mut cb: impl FnMut(&PackageSummary)) -> Result<()> {
        let scoped = self.config.registry.scoped_dest();
        for id in self.db.fetch_all_installed() {
            let pkg = self.db.get(id);
            if scoped.is_none() || pkg.dest.as_deref() == scoped {
                cb(&PackageSummary::from(pkg));
            }
        }
        Ok(())
    }

    /// Status records on destinations
    pub fn package_status(
        &self,
        pattern: Option<&str>,
        mut cb: impl FnMut(&Package),
    ) -> Result<()> {
        for id in self.db.fetch_available(pattern)? {
            let pkg = self.db.get(id);
            if pkg.dest.is_some() && pkg.state_status != StateStatus::NotInstalled {
                cb(pkg);
            }
        }
        Ok(())
    }

    /// Every record matching `pattern`, feed and installed
    pub fn package_info(&self, pattern: Option<&str>, mut cb: impl FnMut(&Package)) -> Result<()> {
        for id in self.db.fetch_available(pattern)? {
            cb(self.db.get(id));
        }
        Ok(())
    }

    /// Files of the installed package `name`
    pub fn package_files(&self, name: &str, mut cb: impl FnMut(&str)) -> Result<()> {
        let id = self.installed(name)?;
        for file in &self.db.get(id).files {
            cb(file);
        }
        Ok(())
    }

    /// Installed files matching `pattern`, with their owner
    pub fn search_file(
        &self,
        pattern: &str,
        mut cb: impl FnMut(&PackageSummary, &str),
    ) -> Result<()> {
        for (id, file) in self.db.search_file(pattern)? {
            cb(&PackageSummary::from(self.db.get(id)), &file);
        }
        Ok(())
    }

    fn what(
        &self,
        kind: RelationKind,
        pattern: &str,
        cb: &mut dyn FnMut(&PackageSummary),
    ) -> Result<()> {
        for id in self.db.what(kind, pattern)? {
            let pkg = self.db.get(id);
            if is_listed(pkg) {
                cb(&PackageSummary::from(pkg));
            }
        }
        Ok(())
    }

    pub fn what_depends(&self, pattern: &str, mut cb: impl FnMut(&PackageSummary)) -> Result<()> {
        self.what(RelationKind::Depends, pattern, &mut cb)
    }

    pub fn what_recommends(
        &self,
        pattern: &str,
        mut cb: impl FnMut(&PackageSummary),
    ) -> Result<()> {
        self.what(RelationKind::Recommends, pattern, &mut cb)
    }

    pub fn what_provides(&self, pattern: &str, mut cb: impl FnMut(&PackageSummary)) -> Result<()> {
        self.what(RelationKind::Provides, pattern, &mut cb)
    }

    pub fn what_conflicts(
        &self,
        pattern: &str,
        mut cb: impl FnMut(&PackageSummary),
    ) -> Result<()> {
        self.what(RelationKind::Conflicts, pattern, &mut cb)
    }

    pub fn what_replaces(&self, pattern: &str, mut cb: impl FnMut(&PackageSummary)) -> Result<()> {
        self.what(RelationKind::Replaces, pattern, &mut cb)
    }

    pub fn get_option(&self, name: &str) -> Result<OptionValue> {
        self.config.get_option(name)
    }

    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()> {
        self.config.set_option(name, value)
    }

    /// Rebuild configuration and database from scratch
    ///
    /// The configuration file is read again and options set at runtime are
    /// layered over it. The current configuration stays active unless the
    /// new one was fully built.
    pub fn reload_config(&mut self) -> Result<()> {
        let config = self.config.reload()?;

        let db = build_database(&config)?;
        self.config = config;
        self.db = db;
        info!("Configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Step;
    use crate::package::StateFlag;
    use crate::registry::{Destination, Registry, Source};
    use std::fs;
    use tempfile::TempDir;

    struct NoTransport;

    impl Transport for NoTransport {
        fn download(
            &self,
            url: &str,
            _dest: &Path,
            _progress: Option<&mut dyn FnMut(u64, u64)>,
        ) -> Result<()> {
            Err(Error::DownloadError(format!("offline: {}", url)))
        }
    }

    /// Bookkeeping, except configuration of the listed names fails and,
    /// when `inconsistent` is set, the preinstall check refuses
    struct FailingConfigure {
        inner: BookkeepingActions,
        failing: Vec<&'static str>,
        inconsistent: bool,
    }

    impl PackageActions for FailingConfigure {
        fn prepare_url(
            &mut self,
            config: &Config,
            db: &mut PackageDatabase,
            request: &str,
        ) -> Result<String> {
            self.inner.prepare_url(config, db, request)
        }

        fn preinstall_check(&mut self, config: &Config, db: &PackageDatabase) -> Result<()> {
            if self.inconsistent {
                return Err(Error::ConflictError("status needs repair".to_string()));
            }
            self.inner.preinstall_check(config, db)
        }

        fn install_by_name(
            &mut self,
            config: &Config,
            db: &mut PackageDatabase,
            name: &str,
        ) -> Result<()> {
            self.inner.install_by_name(config, db, name)
        }

        fn install_multi_by_name(
            &mut self,
            config: &Config,
            db: &mut PackageDatabase,
            name: &str,
        ) -> Result<()> {
            self.inner.install_multi_by_name(config, db, name)
        }

        fn configure(&mut self, _config: &Config, db: &PackageDatabase, id: PackageId) -> Result<()> {
            let name = db.get(id).name.clone();
            if self.failing.contains(&name.as_str()) {
                return Err(Error::StepFailed {
                    step: Step::Configure,
                    package: name,
                    code: 3,
                });
            }
            Ok(())
        }

        fn remove(
            &mut self,
            config: &Config,
            db: &PackageDatabase,
            id: PackageId,
            purge: bool,
        ) -> Result<()> {
            self.inner.remove(config, db, id, purge)
        }

        fn upgrade(
            &mut self,
            config: &Config,
            db: &mut PackageDatabase,
            id: PackageId,
        ) -> Result<()> {
            self.inner.upgrade(config, db, id)
        }
    }

    fn write_feed(dir: &TempDir) -> Config {
        let lists = dir.path().join("lists");
        fs::create_dir_all(&lists).unwrap();
        fs::write(
            lists.join("base"),
            "Package: foo\nVersion: 1.0\nDepends: bar\n\n\
             Package: bar\nVersion: 1.0\n\n\
             Package: baz\nVersion: 0.9\n",
        )
        .unwrap();

        let mut registry = Registry::new(
            &lists,
            vec![Destination::new("root", dir.path().join("root"))],
        )
        .unwrap();
        registry
            .add_source(Source::new("base", "http://feeds/base", false))
            .unwrap();
        let mut config = Config::new(registry);
        config.tmp_dir = dir.path().join("tmp");
        config
    }

    fn session(config: Config, failing: Vec<&'static str>) -> Session {
        let actions = FailingConfigure {
            inner: BookkeepingActions::new(),
            failing,
            inconsistent: false,
        };
        Session::with_parts(config, Box::new(actions), Box::new(NoTransport)).unwrap()
    }

    fn state(session: &Session, name: &str) -> Option<StateStatus> {
        session
            .database()
            .fetch_installed_by_name(name)
            .map(|id| session.database().get(id).state_status)
    }

    #[test]
    fn test_install_configures_dependencies() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());

        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        session.install_package("foo", Some(&mut sink)).unwrap();

        assert_eq!(seen, vec![0, 50, 75, 100]);
        assert_eq!(state(&session, "foo"), Some(StateStatus::Installed));
        assert_eq!(state(&session, "bar"), Some(StateStatus::Installed));

        let db = session.database();
        let foo = db.fetch_installed_by_name("foo").unwrap();
        assert!(!db.get(foo).state_flag.contains(StateFlag::PREFER));
        let parent = db.get(foo).parent.unwrap();
        assert_eq!(db.get(parent).state_status, StateStatus::Installed);
    }

    #[test]
    fn test_configure_failure_is_batched() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), vec!["bar"]);

        let err = session.install_package("foo", None).unwrap_err();
        assert_eq!(err.code(), 3);
        assert_eq!(state(&session, "bar"), Some(StateStatus::Unpacked));
        // foo is configured although bar failed before it
        assert_eq!(state(&session, "foo"), Some(StateStatus::Installed));
    }

    #[test]
    fn test_configure_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());
        session.install_package("foo", None).unwrap();

        session.configure_packages(None).unwrap();
        session.configure_packages(None).unwrap();
        assert_eq!(state(&session, "foo"), Some(StateStatus::Installed));
    }

    #[test]
    fn test_configure_pattern_filter() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), vec!["bar"]);
        let _ = session.install_package("foo", None);

        // Only baz-like names are retried, bar stays unpacked without error
        session.configure_packages(Some("baz*")).unwrap();
        assert_eq!(state(&session, "bar"), Some(StateStatus::Unpacked));
        assert!(session.configure_packages(Some("b?r")).is_err());
    }

    #[test]
    fn test_remove_not_installed() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());

        let err = session.remove_package("foo", false, None).unwrap_err();
        assert!(matches!(err, Error::NotInstalled(_)));

        let err = session.upgrade_package("foo", None).unwrap_err();
        assert!(matches!(err, Error::NotInstalled(_)));
    }

    #[test]
    fn test_upgrades_run_preinstall_check() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());
        session.install_package("baz", None).unwrap();

        session.actions = Box::new(FailingConfigure {
            inner: BookkeepingActions::new(),
            failing: Vec::new(),
            inconsistent: true,
        });
        let err = session.upgrade_package("baz", None).unwrap_err();
        assert!(err.to_string().contains("status needs repair"));
        let err = session.upgrade_all(None).unwrap_err();
        assert!(err.to_string().contains("status needs repair"));
        assert_eq!(state(&session, "baz"), Some(StateStatus::Installed));
    }

    #[test]
    fn test_update_drops_withdrawn_versions() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());
        session.install_package("baz", None).unwrap();

        // The cached list no longer carries foo, and baz went back to 0.8
        fs::write(
            dir.path().join("lists").join("base"),
            "Package: bar\nVersion: 1.0\n\nPackage: baz\nVersion: 0.8\n",
        )
        .unwrap();
        session.update_package_lists(None).unwrap();

        let db = session.database();
        let candidate = db.best_candidate("baz").unwrap();
        assert_eq!(db.get(candidate).version, "0.8");
        assert!(db.best_candidate("foo").is_none());
        let installed = db.fetch_installed_by_name("baz").unwrap();
        assert_eq!(db.get(installed).version, "0.9");
        assert_eq!(db.get(installed).parent, None);
    }

    #[test]
    fn test_remove_then_lookup() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());
        session.install_package("baz", None).unwrap();

        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        session.remove_package("baz", false, Some(&mut sink)).unwrap();

        assert_eq!(seen, vec![0, 25, 75, 100]);
        assert!(session.database().fetch_installed_by_name("baz").is_none());
    }

    #[test]
    fn test_listings_and_queries() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());
        session.install_package("foo", None).unwrap();

        let mut names = Vec::new();
        session.list_packages(None, |p| names.push(p.name.clone())).unwrap();
        assert_eq!(names, vec!["foo", "bar", "baz"]);

        let mut installed = Vec::new();
        session.list_installed(|p| installed.push(p.name.clone())).unwrap();
        installed.sort();
        assert_eq!(installed, vec!["bar", "foo"]);

        let mut dependents = Vec::new();
        session
            .what_depends("bar", |p| dependents.push(p.name.clone()))
            .unwrap();
        assert_eq!(dependents, vec!["foo"]);

        let mut statuses = Vec::new();
        session
            .package_status(Some("f*"), |p| statuses.push(p.state_status))
            .unwrap();
        assert_eq!(statuses, vec![StateStatus::Installed]);

        let mut records = 0;
        session.package_info(Some("foo"), |_| records += 1).unwrap();
        assert_eq!(records, 2);
    }

    #[test]
    fn test_download_needs_archive() {
        let dir = TempDir::new().unwrap();
        let session = session(write_feed(&dir), Vec::new());

        let err = session.download_package("foo", dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
        assert!(session.download_package("missing", dir.path()).is_err());
    }

    #[test]
    fn test_options_survive_reload() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());

        session
            .set_option("force_reinstall", OptionValue::Bool(true))
            .unwrap();
        assert!(matches!(
            session.set_option("force_reinstall", OptionValue::Int(1)),
            Err(Error::OptionType { .. })
        ));
        assert!(matches!(
            session.get_option("no_such_option"),
            Err(Error::UnknownOption(_))
        ));

        session.install_package("baz", None).unwrap();
        session.reload_config().unwrap();

        assert_eq!(
            session.get_option("force_reinstall").unwrap(),
            OptionValue::Bool(true)
        );
        assert_eq!(state(&session, "baz"), Some(StateStatus::Installed));
    }

    #[test]
    fn test_reload_picks_up_file_and_keeps_overrides() {
        let dir = TempDir::new().unwrap();
        write_feed(&dir);
        let path = dir.path().join("sprig.toml");
        let text = format!(
            "lists_dir = {:?}\ntmp_dir = {:?}\n\n\
             [[dest]]\nname = \"root\"\nroot = {:?}\n\n\
             [[dest]]\nname = \"ram\"\nroot = {:?}\n\n\
             [[src]]\nname = \"base\"\nurl = \"http://feeds/base\"\n\n\
             [options]\nnodeps = false\n",
            dir.path().join("lists"),
            dir.path().join("tmp"),
            dir.path().join("root"),
            dir.path().join("ram"),
        );
        fs::write(&path, &text).unwrap();
        let mut session = session(Config::from_file(&path).unwrap(), Vec::new());

        session
            .set_option("default_dest", OptionValue::String(Some("ram".to_string())))
            .unwrap();
        session
            .set_option("restrict_to_default_dest", OptionValue::Bool(true))
            .unwrap();
        fs::write(&path, text.replace("nodeps = false", "nodeps = true")).unwrap();
        session.reload_config().unwrap();

        assert_eq!(session.get_option("nodeps").unwrap(), OptionValue::Bool(true));
        assert_eq!(
            session.get_option("default_dest").unwrap(),
            OptionValue::String(Some("ram".to_string()))
        );
        assert_eq!(
            session.get_option("restrict_to_default_dest").unwrap(),
            OptionValue::Bool(true)
        );

        // nodeps from the file: foo lands on ram without bar
        session.install_package("foo", None).unwrap();
        let db = session.database();
        assert!(db.fetch_installed_by_name_dest("foo", "ram").is_some());
        assert!(db.fetch_installed_by_name("bar").is_none());
    }

    #[test]
    fn test_file_queries_on_installed_package() {
        let dir = TempDir::new().unwrap();
        let mut session = session(write_feed(&dir), Vec::new());

        let mut providers = Vec::new();
        session
            .what_provides("*", |p| providers.push(p.name.clone()))
            .unwrap();
        assert!(providers.is_empty());

        assert!(matches!(
            session.package_files("bar", |_| {}),
            Err(Error::NotInstalled(_))
        ));
        session.install_package("bar", None).unwrap();

        let mut files = 0;
        session.package_files("bar", |_| files += 1).unwrap();
        assert_eq!(files, 0);

        let mut hits = 0;
        session.search_file("/usr/*", |_, _| hits += 1).unwrap();
        assert_eq!(hits, 0);
    }
}
