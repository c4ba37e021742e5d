// src/package/state.rs

//! Package lifecycle states and the transitions the engine owns

use std::fmt;
use std::str::FromStr;

/// Where a package record is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateStatus {
    #[default]
    NotInstalled,
    /// Contents laid down, configuration not yet run
    Unpacked,
    HalfConfigured,
    Installed,
    HalfInstalled,
    ConfigFiles,
    PostInstFailed,
    RemovalFailed,
}

impl StateStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StateStatus::NotInstalled => "not-installed",
            StateStatus::Unpacked => "unpacked",
            StateStatus::HalfConfigured => "half-configured",
            StateStatus::Installed => "installed",
            StateStatus::HalfInstalled => "half-installed",
            StateStatus::ConfigFiles => "config-files",
            StateStatus::PostInstFailed => "post-inst-failed",
            StateStatus::RemovalFailed => "removal-failed",
        }
    }

    /// Installed, unpacked or half-configured
    pub fn is_installed_family(&self) -> bool {
        matches!(
            self,
            StateStatus::Installed | StateStatus::Unpacked | StateStatus::HalfConfigured
        )
    }

    /// Next state after `transition`, or `None` if the move is illegal
    pub fn apply(self, transition: Transition) -> Option<StateStatus> {
        use StateStatus::*;

        match (transition, self) {
            (Transition::Unpack, NotInstalled | ConfigFiles | HalfInstalled | Unpacked) => {
                Some(Unpacked)
            }
            (Transition::Configure, Unpacked | HalfConfigured | PostInstFailed | Installed) => {
                Some(Installed)
            }
            (Transition::ConfigureFailed, Unpacked | HalfConfigured) => Some(Unpacked),
            (Transition::Remove, NotInstalled) => None,
            (Transition::Remove, _) => Some(NotInstalled),
            _ => None,
        }
    }
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not-installed" => Ok(StateStatus::NotInstalled),
            "unpacked" => Ok(StateStatus::Unpacked),
            "half-configured" => Ok(StateStatus::HalfConfigured),
            "installed" => Ok(StateStatus::Installed),
            "half-installed" => Ok(StateStatus::HalfInstalled),
            "config-files" => Ok(StateStatus::ConfigFiles),
            "post-inst-failed" => Ok(StateStatus::PostInstFailed),
            "removal-failed" => Ok(StateStatus::RemovalFailed),
            _ => Err(format!("Invalid state status: {}", s)),
        }
    }
}

/// Lifecycle events that move a package between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unpack,
    Configure,
    ConfigureFailed,
    Remove,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Unpack => "unpack",
            Transition::Configure => "configure",
            Transition::ConfigureFailed => "configure-failed",
            Transition::Remove => "remove",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// Per-package state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlag: u32 {
        /// Reinstallation required
        const REINSTREQ = 1 << 0;
        /// Held at the current version
        const HOLD = 1 << 1;
        const REPLACE = 1 << 2;
        const NOPRUNE = 1 << 3;
        /// Preferred candidate; cleared once configuration succeeds
        const PREFER = 1 << 4;
        const OBSOLETE = 1 << 5;
        /// Explicitly requested by the user
        const USER = 1 << 6;
        /// File list must be rewritten on the next status write
        const FILELIST_CHANGED = 1 << 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_only_from_unpacked_family() {
        assert_eq!(
            StateStatus::Unpacked.apply(Transition::Configure),
            Some(StateStatus::Installed)
        );
        assert_eq!(
            StateStatus::Installed.apply(Transition::Configure),
            Some(StateStatus::Installed)
        );
        assert_eq!(StateStatus::NotInstalled.apply(Transition::Configure), None);
    }

    #[test]
    fn test_configure_failure_stays_unpacked() {
        assert_eq!(
            StateStatus::Unpacked.apply(Transition::ConfigureFailed),
            Some(StateStatus::Unpacked)
        );
        assert_eq!(StateStatus::Installed.apply(Transition::ConfigureFailed), None);
    }

    #[test]
    fn test_remove() {
        assert_eq!(
            StateStatus::Installed.apply(Transition::Remove),
            Some(StateStatus::NotInstalled)
        );
        assert_eq!(
            StateStatus::Unpacked.apply(Transition::Remove),
            Some(StateStatus::NotInstalled)
        );
        assert_eq!(StateStatus::NotInstalled.apply(Transition::Remove), None);
    }

    #[test]
    fn test_unpack_requires_not_installed() {
        assert_eq!(
            StateStatus::NotInstalled.apply(Transition::Unpack),
            Some(StateStatus::Unpacked)
        );
        assert_eq!(StateStatus::Installed.apply(Transition::Unpack), None);
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            StateStatus::NotInstalled,
            StateStatus::HalfConfigured,
            StateStatus::RemovalFailed,
        ] {
            assert_eq!(status.as_str().parse::<StateStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<StateStatus>().is_err());
    }

    #[test]
    fn test_installed_family() {
        assert!(StateStatus::HalfConfigured.is_installed_family());
        assert!(!StateStatus::ConfigFiles.is_installed_family());
    }
}
