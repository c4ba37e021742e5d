// src/config.rs

//! Engine configuration
//!
//! A `Config` is built in one go from a TOML file (or from defaults) and is
//! never patched in place by a reload: the session builds a fresh value and
//! swaps it in once construction succeeded. Every value set through
//! `set_option` (the command line goes through it too) is also recorded as
//! a runtime override and replayed over the freshly parsed file on reload.
//!
//! ```toml
//! lists_dir = "/var/lib/sprig/lists"
//! default_dest = "root"
//!
//! [[dest]]
//! name = "root"
//! root = "/"
//!
//! [[src]]
//! name = "base"
//! url = "http://feeds.example.com/armv7"
//! gzip = true
//!
//! [options]
//! force_depends = false
//! ```

use crate::error::{Error, Result};
use crate::registry::{Destination, Registry, STATUS_SUBDIR, Source};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sprig/sprig.toml";

/// Force/override flags and other runtime switches
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub force_depends: bool,
    pub force_defaults: bool,
    pub force_overwrite: bool,
    pub force_downgrade: bool,
    pub force_reinstall: bool,
    pub force_removal_of_dependent_packages: bool,
    pub force_removal_of_essential_packages: bool,
    pub nodeps: bool,
    /// Do not persist any state change
    pub noaction: bool,
    pub query_all: bool,
    /// Install every provider of a requested name instead of exactly one
    pub multiple_providers: bool,
    pub autoremove: bool,
    /// Fetch and verify `Packages.sig`; on whenever signature support is built
    pub check_signature: bool,
    pub verbosity: i64,
    /// Prefix applied to every destination root and the lists directory;
    /// changes take effect on the next reload
    pub offline_root: Option<String>,
    pub offline_root_pre_script_cmd: Option<String>,
    pub offline_root_post_script_cmd: Option<String>,
    /// Directory holding trusted OpenPGP certificates
    pub signature_keyring: Option<String>,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            force_depends: false,
            force_defaults: false,
            force_overwrite: false,
            force_downgrade: false,
            force_reinstall: false,
            force_removal_of_dependent_packages: false,
            force_removal_of_essential_packages: false,
            nodeps: false,
            noaction: false,
            query_all: false,
            multiple_providers: false,
            autoremove: false,
            check_signature: cfg!(feature = "signature"),
            verbosity: 0,
            offline_root: None,
            offline_root_pre_script_cmd: None,
            offline_root_post_script_cmd: None,
            signature_keyring: None,
        }
    }
}

/// Storage kind of a named option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    String,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptionKind::Bool => "boolean",
            OptionKind::Int => "integer",
            OptionKind::String => "string",
        };
        f.write_str(s)
    }
}

/// Value of a named option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    String(Option<String>),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::String(_) => OptionKind::String,
        }
    }

    /// Parse command line text for an option of the given kind
    pub fn parse(kind: OptionKind, text: &str) -> Result<Self> {
        match kind {
            OptionKind::Bool => match text {
                "1" | "true" | "yes" | "on" => Ok(OptionValue::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(OptionValue::Bool(false)),
                _ => Err(Error::ParseError(format!("'{}' is not a boolean", text))),
            },
            OptionKind::Int => text
                .parse()
                .map(OptionValue::Int)
                .map_err(|e| Error::ParseError(format!("'{}' is not an integer: {}", text, e))),
            OptionKind::String => Ok(OptionValue::String(
                (!text.is_empty()).then(|| text.to_string()),
            )),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::String(Some(s)) => f.write_str(s),
            OptionValue::String(None) => Ok(()),
        }
    }
}

/// Every option reachable through `get_option`/`set_option`
pub const OPTIONS: &[(&str, OptionKind)] = &[
    ("autoremove", OptionKind::Bool),
    ("check_signature", OptionKind::Bool),
    ("default_dest", OptionKind::String),
    ("force_defaults", OptionKind::Bool),
    ("force_depends", OptionKind::Bool),
    ("force_downgrade", OptionKind::Bool),
    ("force_overwrite", OptionKind::Bool),
    ("force_reinstall", OptionKind::Bool),
    ("force_removal_of_dependent_packages", OptionKind::Bool),
    ("force_removal_of_essential_packages", OptionKind::Bool),
    ("multiple_providers", OptionKind::Bool),
    ("noaction", OptionKind::Bool),
    ("nodeps", OptionKind::Bool),
    ("offline_root", OptionKind::String),
    ("offline_root_post_script_cmd", OptionKind::String),
    ("offline_root_pre_script_cmd", OptionKind::String),
    ("query_all", OptionKind::Bool),
    ("restrict_to_default_dest", OptionKind::Bool),
    ("signature_keyring", OptionKind::String),
    ("verbosity", OptionKind::Int),
];

/// Look up the declared kind of an option
pub fn option_kind(name: &str) -> Option<OptionKind> {
    OPTIONS.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DestEntry {
    name: String,
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SrcEntry {
    name: String,
    url: String,
    #[serde(default)]
    dist: Option<String>,
    #[serde(default)]
    gzip: bool,
}

#[derive(Debug, Default, Deserialize)]
struct OptionsTable {
    #[serde(flatten)]
    flags: Flags,
    #[serde(default)]
    restrict_to_default_dest: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    lists_dir: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
    default_dest: Option<String>,
    #[serde(default)]
    dest: Vec<DestEntry>,
    #[serde(default)]
    src: Vec<SrcEntry>,
    #[serde(default)]
    options: OptionsTable,
}

/// Live configuration of one engine session
#[derive(Debug, Clone)]
pub struct Config {
    pub registry: Registry,
    pub flags: Flags,
    /// Parent directory for per-run temporary directories
    pub tmp_dir: PathBuf,
    config_path: Option<PathBuf>,
    /// Values set at runtime, replayed over the file on reload
    overrides: BTreeMap<String, OptionValue>,
}

impl Config {
    /// Configuration over an explicit registry with default flags
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            flags: Flags::default(),
            tmp_dir: std::env::temp_dir(),
            config_path: None,
            overrides: BTreeMap::new(),
        }
    }

    /// Single destination `root` at `root_dir`, no sources
    pub fn for_root(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        let registry = Registry::new(
            root_dir.join(STATUS_SUBDIR).join("lists"),
            vec![Destination::new("root", root_dir)],
        )?;
        Ok(Self::new(registry))
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_overrides(path, &BTreeMap::new())
    }

    /// Load a configuration file and apply `overrides` on top of its options
    ///
    /// An `offline_root` override also reroots the file's paths.
    pub fn from_file_with_overrides(
        path: impl AsRef<Path>,
        overrides: &BTreeMap<String, OptionValue>,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());

        let text = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse_with_overrides(&text, overrides)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_overrides(text, &BTreeMap::new())
    }

    fn parse_with_overrides(text: &str, overrides: &BTreeMap<String, OptionValue>) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {}", e)))?;

        let restrict = file.options.restrict_to_default_dest;
        let mut flags = file.options.flags;
        if let Some(OptionValue::String(root)) = overrides.get("offline_root") {
            flags.offline_root = root.clone();
        }
        let offline_root = flags.offline_root.as_deref().map(PathBuf::from);
        let rooted = |p: &Path| match &offline_root {
            Some(root) => root.join(p.strip_prefix("/").unwrap_or(p)),
            None => p.to_path_buf(),
        };

        let mut destinations: Vec<Destination> = file
            .dest
            .iter()
            .map(|d| Destination::new(d.name.clone(), rooted(&d.root)))
            .collect();
        if destinations.is_empty() {
            destinations.push(Destination::new("root", rooted(Path::new("/"))));
        }

        let lists_dir = match &file.lists_dir {
            Some(dir) => rooted(dir),
            None => rooted(&Path::new("/").join(STATUS_SUBDIR).join("lists")),
        };

        let mut registry = Registry::new(lists_dir, destinations)?;
        for src in file.src {
            let mut source = Source::new(src.name, src.url, src.gzip);
            source.extra_data = src.dist;
            registry.add_source(source)?;
        }
        if let Some(name) = &file.default_dest {
            registry.set_default_destination(name)?;
        }
        registry.restrict_to_default_dest = restrict;

        let mut config = Self {
            registry,
            flags,
            tmp_dir: file.tmp_dir.unwrap_or_else(std::env::temp_dir),
            config_path: None,
            overrides: BTreeMap::new(),
        };
        for (name, value) in overrides {
            config.set_option(name, value.clone())?;
        }
        Ok(config)
    }

    /// Build this configuration again from its file, with the runtime
    /// overrides replayed on top
    ///
    /// Without a file there is nothing to re-read and the result is a copy.
    pub fn reload(&self) -> Result<Self> {
        match &self.config_path {
            Some(path) => Self::from_file_with_overrides(path, &self.overrides),
            None => Ok(self.clone()),
        }
    }

    /// Options set at runtime, by name
    pub fn overrides(&self) -> &BTreeMap<String, OptionValue> {
        &self.overrides
    }

    /// File this configuration was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Read a named option
    pub fn get_option(&self, name: &str) -> Result<OptionValue> {
        let f = &self.flags;
        let value = match name {
            "autoremove" => OptionValue::Bool(f.autoremove),
            "check_signature" => OptionValue::Bool(f.check_signature),
            "default_dest" => {
                OptionValue::String(Some(self.registry.default_destination().name.clone()))
            }
            "force_defaults" => OptionValue::Bool(f.force_defaults),
            "force_depends" => OptionValue::Bool(f.force_depends),
            "force_downgrade" => OptionValue::Bool(f.force_downgrade),
            "force_overwrite" => OptionValue::Bool(f.force_overwrite),
            "force_reinstall" => OptionValue::Bool(f.force_reinstall),
            "force_removal_of_dependent_packages" => {
                OptionValue::Bool(f.force_removal_of_dependent_packages)
            }
            "force_removal_of_essential_packages" => {
                OptionValue::Bool(f.force_removal_of_essential_packages)
            }
            "multiple_providers" => OptionValue::Bool(f.multiple_providers),
            "noaction" => OptionValue::Bool(f.noaction),
            "nodeps" => OptionValue::Bool(f.nodeps),
            "offline_root" => OptionValue::String(f.offline_root.clone()),
            "offline_root_post_script_cmd" => {
                OptionValue::String(f.offline_root_post_script_cmd.clone())
            }
            "offline_root_pre_script_cmd" => {
                OptionValue::String(f.offline_root_pre_script_cmd.clone())
            }
            "query_all" => OptionValue::Bool(f.query_all),
            "restrict_to_default_dest" => {
                OptionValue::Bool(self.registry.restrict_to_default_dest)
            }
            "signature_keyring" => OptionValue::String(f.signature_keyring.clone()),
            "verbosity" => OptionValue::Int(f.verbosity),
            _ => return Err(Error::UnknownOption(name.to_string())),
        };
        Ok(value)
    }

    /// Set a named option; the value must match the option's kind
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()> {
        let expected = option_kind(name).ok_or_else(|| Error::UnknownOption(name.to_string()))?;
        if value.kind() != expected {
            return Err(Error::OptionType {
                name: name.to_string(),
                expected,
            });
        }

        let recorded = value.clone();
        let f = &mut self.flags;
        match (name, value) {
            ("default_dest", OptionValue::String(Some(dest))) => {
                self.registry.set_default_destination(&dest)?
            }
            ("default_dest", OptionValue::String(None)) => {
                return Err(Error::ConfigError("default_dest cannot be empty".to_string()));
            }
            ("restrict_to_default_dest", OptionValue::Bool(b)) => {
                self.registry.restrict_to_default_dest = b
            }
            ("verbosity", OptionValue::Int(i)) => f.verbosity = i,
            (_, OptionValue::Bool(b)) => *bool_flag(f, name)? = b,
            (_, OptionValue::String(s)) => *string_flag(f, name)? = s,
            (_, OptionValue::Int(_)) => return Err(Error::UnknownOption(name.to_string())),
        }

        self.overrides.insert(name.to_string(), recorded);
        debug!("Option {} updated", name);
        Ok(())
    }
}

fn bool_flag<'a>(f: &'a mut Flags, name: &str) -> Result<&'a mut bool> {
    let slot = match name {
        "autoremove" => &mut f.autoremove,
        "check_signature" => &mut f.check_signature,
        "force_defaults" => &mut f.force_defaults,
        "force_depends" => &mut f.force_depends,
        "force_downgrade" => &mut f.force_downgrade,
        "force_overwrite" => &mut f.force_overwrite,
        "force_reinstall" => &mut f.force_reinstall,
        "force_removal_of_dependent_packages" => &mut f.force_removal_of_dependent_packages,
        "force_removal_of_essential_packages" => &mut f.force_removal_of_essential_packages,
        "multiple_providers" => &mut f.multiple_providers,
        "noaction" => &mut f.noaction,
        "nodeps" => &mut f.nodeps,
        "query_all" => &mut f.query_all,
        _ => return Err(Error::UnknownOption(name.to_string())),
    };
    Ok(slot)
}

fn string_flag<'a>(f: &'a mut Flags, name: &str) -> Result<&'a mut Option<String>> {
    let slot = match name {
        "offline_root" => &mut f.offline_root,
        "offline_root_post_script_cmd" => &mut f.offline_root_post_script_cmd,
        "offline_root_pre_script_cmd" => &mut f.offline_root_pre_script_cmd,
        "signature_keyring" => &mut f.signature_keyring,
        _ => return Err(Error::UnknownOption(name.to_string())),
    };
    Ok(slot)
}
