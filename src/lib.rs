// src/lib.rs

//! Sprig Package Engine
//!
//! Lightweight package transaction engine for embedded Linux systems,
//! managing `.ipk`-style packages across one or more installation roots.
//!
//! # Architecture
//!
//! - Registry: named destinations (installation roots) and package sources
//! - Package database: feed records plus installed records, in memory
//! - Status database: per-destination SQLite file, the durable record
//! - Sessions: install, remove, upgrade and configure, one at a time
//! - Repository: list synchronization with per-source outcomes, optional
//!   detached signature checks, checksummed archive downloads

pub mod config;
pub mod database;
mod error;
pub mod package;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod status;
pub mod transaction;

pub use config::{Config, Flags, OptionValue};
pub use error::{Error, Result, Step};
pub use transaction::Session;
