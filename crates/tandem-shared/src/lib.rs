//! # tandem-shared
//!
//! Domain types and wire protocol for the Tandem real-time messaging core.
//!
//! This crate is the common vocabulary between the relay server and its
//! persistence layer: identity and relationship models, the closed set of
//! events exchanged over a live connection, and the relay error taxonomy.

pub mod constants;
pub mod protocol;
pub mod types;

mod error;

pub use error::{ErrorReason, RelayError};
pub use types::*;
