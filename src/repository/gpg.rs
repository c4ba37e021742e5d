// src/repository/gpg.rs

//! Detached signature verification for package lists
//!
//! Uses the sequoia-openpgp library (pure Rust implementation). Trusted
//! keys are every certificate found in the keyring directory.

use crate::error::{Error, Result};
use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use openpgp::parse::stream::{
    DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper,
};
use openpgp::policy::StandardPolicy;
use openpgp::{Cert, KeyHandle};
use sequoia_openpgp as openpgp;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const KEY_EXTENSIONS: [&str; 3] = ["asc", "gpg", "pgp"];

/// Verifies files against detached signatures made by trusted keys
pub struct SignatureVerifier {
    certs: Vec<Cert>,
    policy: StandardPolicy<'static>,
}

impl SignatureVerifier {
    pub fn new(certs: Vec<Cert>) -> Self {
        Self {
            certs,
            policy: StandardPolicy::new(),
        }
    }

    /// Load every certificate in `keyring_dir`
    pub fn from_keyring(keyring_dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(keyring_dir).map_err(|e| {
            Error::SignatureError(format!(
                "Cannot read keyring {}: {}",
                keyring_dir.display(),
                e
            ))
        })?;

        let mut certs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_key = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| KEY_EXTENSIONS.contains(&ext));
            if !is_key {
                continue;
            }

            let parser = CertParser::from_file(&path).map_err(|e| {
                Error::SignatureError(format!("Cannot parse key {}: {}", path.display(), e))
            })?;
            for cert in parser {
                match cert {
                    Ok(cert) => {
                        debug!("Trusting key {} from {}", cert.fingerprint(), path.display());
                        certs.push(cert);
                    }
                    Err(e) => warn!("Skipping bad certificate in {}: {}", path.display(), e),
                }
            }
        }

        if certs.is_empty() {
            return Err(Error::SignatureError(format!(
                "No usable keys in {}",
                keyring_dir.display()
            )));
        }

        Ok(Self::new(certs))
    }

    pub fn key_count(&self) -> usize {
        self.certs.len()
    }

    /// Verify `data` against the detached signature in `signature`
    pub fn verify_file(&self, data: &Path, signature: &Path) -> Result<()> {
        let sig = fs::read(signature)?;

        let helper = TrustedKeys { certs: &self.certs };
        let mut verifier = DetachedVerifierBuilder::from_bytes(&sig)
            .map_err(|e| Error::SignatureError(format!("Malformed signature: {}", e)))?
            .with_policy(&self.policy, None, helper)
            .map_err(|e| Error::SignatureError(e.to_string()))?;

        verifier
            .verify_file(data)
            .map_err(|e| Error::SignatureError(format!("{}: {}", data.display(), e)))?;

        debug!("Signature of {} verified", data.display());
        Ok(())
    }
}

struct TrustedKeys<'a> {
    certs: &'a [Cert],
}

impl VerificationHelper for TrustedKeys<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.to_vec())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|r| r.is_ok()) {
                    return Ok(());
                }
            }
        }
        Err(anyhow::anyhow!("no good signature from a trusted key"))
    }
}
