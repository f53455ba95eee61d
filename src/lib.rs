// src/lib.rs

//! Debrec — Debian repository recorder
//!
//! Mirrors a Debian-style package repository into a local control-file
//! cache and a normalized SQLite index.
//!
//! # Architecture
//!
//! - Database-first: all recorded state lives in SQLite
//! - Checksum-driven: cached `Packages.gz` files are refetched only when
//!   the branch `Release` manifest declares a different md5sum
//! - Idempotent reconciliation: packages, per-arch build details, tags
//!   and inter-package relations converge under repeated syncs
//! - Shared relation rows: a relation is deleted only once no details
//!   record references it anymore

pub mod control;
pub mod db;
mod error;
pub mod recorder;
pub mod repository;

pub use error::{Error, Result};
