//! SQLite mirror of the module index.
//!
//! The database is a local copy of an append-only feed, so it is both the
//! data users query and the only state the synchronizer resumes from. There
//! is no separate "last synced" bookkeeping: the resume cursor is whichever
//! version row carries the greatest timestamp.
//!
//! # Schema
//! - **paths**: one row per module path, created on first sighting.
//! - **versions**: one row per `(path, version)` with the feed timestamp,
//!   stored as fixed-width RFC 3339 text and indexed for cursor lookups.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::Repository;
