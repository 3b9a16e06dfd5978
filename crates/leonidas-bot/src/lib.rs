//! Leonidas Bot — command flows behind the Discord surface.
//!
//! This crate contains:
//! - **router**: hands the next chat message to a waiting flow
//! - **configurator**: `configure_env` / `undo_env`
//! - **launcher** / **pty**: docker-compose build and PTY-attached run
//! - **bridge**: drives one `summon` session
//! - **dispatcher**: consumes the bus and runs each command as a task
//! - **query**: JSON POST helper for integrations

pub mod bridge;
pub mod configurator;
pub mod dispatcher;
pub mod launcher;
pub mod pty;
pub mod query;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{BridgeSettings, SessionBridge, SessionReport};
pub use configurator::Configurator;
pub use dispatcher::{Dispatcher, COMMANDS};
pub use launcher::{AgentProcess, ComposeLauncher, SessionLauncher};
pub use query::QueryClient;
pub use router::{ReplyFilter, ReplyHandle, ReplyRouter};
