//! Error taxonomy for command flows.
//!
//! Every variant carries a user-facing rendering via [`BridgeError::user_message`];
//! the dispatcher posts that text as the invocation's outcome follow-up.

use thiserror::Error;

/// Failure of a configure/summon/undo flow.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The env file could not be read or written.
    #[error("env file write failed: {0}")]
    ConfigWrite(#[from] std::io::Error),

    /// The image build command ran but exited unsuccessfully.
    #[error("image build exited with {status}")]
    Build { status: String },

    /// The image build command could not be started.
    #[error("image build could not start: {0}")]
    BuildSpawn(std::io::Error),

    /// The container process could not be launched.
    #[error("container launch failed: {0}")]
    Launch(String),

    /// Reading or writing the pseudo-terminal failed.
    #[error("terminal i/o failed: {0}")]
    Pty(String),

    /// The user did not answer a prompt in time.
    #[error("no reply within {secs}s")]
    Timeout { secs: u64 },

    /// A chat API call failed.
    #[error("chat delivery failed: {0}")]
    Chat(String),

    /// The reply router is gone (dispatcher shutting down).
    #[error("reply router closed")]
    RouterClosed,
}

impl BridgeError {
    /// Text shown to the user in the outcome follow-up.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::ConfigWrite(e) => {
                format!("Failed to write the environment file: {e}")
            }
            BridgeError::Build { status } => format!("Image build failed: {status}"),
            BridgeError::BuildSpawn(e) => format!("Image build failed: {e}"),
            BridgeError::Launch(msg) => {
                format!("Failed to launch the agent container: {msg}")
            }
            BridgeError::Pty(msg) => format!("Terminal I/O failed: {msg}"),
            BridgeError::Timeout { .. } => {
                "You took too long to answer. Please try again.".to_string()
            }
            BridgeError::Chat(msg) => format!("Chat delivery failed: {msg}"),
            BridgeError::RouterClosed => "The bot is shutting down.".to_string(),
        }
    }

    /// Whether this is a prompt timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Result alias for flow operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
