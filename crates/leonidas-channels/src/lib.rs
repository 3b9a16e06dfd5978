//! Leonidas Channels — chat platform integrations.
//!
//! This crate provides:
//! - **base**: the `Channel` (inbound) and `ChatClient` (outbound) traits
//! - **discord**: Gateway v10 WebSocket that feeds the bus
//! - **rest**: Discord REST client implementing `ChatClient`

pub mod base;

#[cfg(feature = "discord")]
pub mod discord;

#[cfg(feature = "discord")]
pub mod rest;

pub use base::{Channel, ChatClient, CommandSpec};

#[cfg(feature = "discord")]
pub use discord::DiscordChannel;

#[cfg(feature = "discord")]
pub use rest::DiscordRest;
