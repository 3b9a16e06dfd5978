//! Leonidas Core — shared building blocks.
//!
//! - **bus**: gateway → dispatcher event bus and its event types
//! - **config**: JSON config schema, loader, env overrides
//! - **envfile**: append-only credential store and the in-process env mirror
//! - **error**: flow error taxonomy
//! - **utils**: paths, identifiers, string helpers

pub mod bus;
pub mod config;
pub mod envfile;
pub mod error;
pub mod utils;

pub use error::{BridgeError, BridgeResult};
