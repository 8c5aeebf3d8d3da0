#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for mssql-backup
//!
//! This library holds all functionality of the mssql-backup tool, which streams the base tables
//! of SQL Server databases into gzip-compressed JSON archives, one run directory per database,
//! described by a JSON manifest.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and orchestration
//! - [`backup`]: The backup engine: value normalization, table archiving, run orchestration,
//!   manifests, schema snapshots, and verification
//! - [`db`]: The database seam the engine works against, and its `tiberius` implementation

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod backup;
pub mod db;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub use crate::commands::{Host, run, run_with};
