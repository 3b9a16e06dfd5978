//! Credential configurator — `configure_env` and `undo_env`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use leonidas_channels::ChatClient;
use leonidas_core::bus::types::Interaction;
use leonidas_core::envfile::{CredentialRecord, EnvFileStore, SessionEnv};
use leonidas_core::error::{BridgeError, BridgeResult};

use crate::router::{ReplyFilter, ReplyHandle};

pub const API_KEY_PROMPT: &str = "Please provide your OpenAI API key:";
pub const CONFIGURED_TEXT: &str = "OpenAI API key and terminal thread ID have been set successfully!";
pub const UNDONE_TEXT: &str = "Removed the most recent credential record.";
pub const NOTHING_TO_UNDO_TEXT: &str = "There is no credential record to remove.";

/// Collects the API key from chat and persists it with a new session id.
pub struct Configurator {
    chat: Arc<dyn ChatClient>,
    store: Arc<EnvFileStore>,
    env: SessionEnv,
    replies: ReplyHandle,
    timeout: Option<Duration>,
}

impl Configurator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        store: Arc<EnvFileStore>,
        env: SessionEnv,
        replies: ReplyHandle,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            chat,
            store,
            env,
            replies,
            timeout,
        }
    }

    /// Prompt, wait for the key, append the record and mirror it.
    ///
    /// The prompt goes to the user's DMs when the command was used in a DM,
    /// otherwise it is posted as an interaction follow-up. The key is taken
    /// verbatim from the user's next message in the invoking channel.
    pub async fn configure(&self, interaction: &Interaction) -> BridgeResult<CredentialRecord> {
        let pending = self
            .replies
            .expect(ReplyFilter::from_user(&interaction.user_id).in_channel(&interaction.channel_id))
            .await?;

        let sent = if interaction.is_direct() {
            self.chat.send_direct(&interaction.user_id, API_KEY_PROMPT).await
        } else {
            self.chat.followup(interaction, API_KEY_PROMPT).await
        };
        sent.map_err(|e| BridgeError::Chat(e.to_string()))?;

        let reply = pending.recv(self.timeout).await?;
        let record = CredentialRecord::new(reply.content);

        self.store.append(&record).await?;
        self.env.apply(&record);
        info!(
            user = %interaction.user_id,
            session_id = %record.session_id,
            path = %self.store.path().display(),
            "credential record stored"
        );
        Ok(record)
    }

    /// Drop the newest record and re-mirror whichever record is now last.
    pub async fn undo(&self) -> BridgeResult<&'static str> {
        undo_last_record(&self.store, &self.env).await
    }
}

/// Remove the newest record from `store` and resync `env` with the file.
pub async fn undo_last_record(store: &EnvFileStore, env: &SessionEnv) -> BridgeResult<&'static str> {
    match store.remove_last_record().await? {
        Some(removed) => {
            info!(lines = removed.0.len(), path = %store.path().display(), "credential record removed");
            env.reset_to(store.last_record().await?.as_ref());
            Ok(UNDONE_TEXT)
        }
        None => Ok(NOTHING_TO_UNDO_TEXT),
    }
}
