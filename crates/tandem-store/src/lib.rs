//! # tandem-store
//!
//! Durable persistence for the Tandem messaging core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for each store the
//! relay consumes: messages, connection records, mentor matches, and the
//! mirrored user directory.

pub mod connections;
pub mod database;
pub mod matches;
pub mod messages;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
