//! Dispatcher — the bot's command surface.
//!
//! Consumes the bus, registers reply waits, and runs each slash command as
//! its own task. Every invocation gets exactly one deferral and exactly one
//! outcome follow-up, whatever happens in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use leonidas_channels::{ChatClient, CommandSpec};
use leonidas_core::bus::queue::MessageBus;
use leonidas_core::bus::types::Interaction;
use leonidas_core::bus::BusEvent;
use leonidas_core::envfile::{EnvFileStore, SessionEnv};
use leonidas_core::error::BridgeResult;
use leonidas_core::utils::generate_session_id;

use crate::bridge::{BridgeSettings, SessionBridge};
use crate::configurator::{Configurator, CONFIGURED_TEXT};
use crate::launcher::SessionLauncher;
use crate::router::{ReplyHandle, ReplyRouter, WaitRequest};

/// Success follow-up for `summon`, sent once the goal has been forwarded.
pub const SUMMONED_TEXT: &str = "Task completed successfully!";

/// Slash commands the bot registers.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "configure_env",
        description: "Configure environment variables",
    },
    CommandSpec {
        name: "summon",
        description: "Summon the AI to execute a specific task",
    },
    CommandSpec {
        name: "undo_env",
        description: "Remove the most recent credential record",
    },
];

/// Pending reply waits the dispatcher can buffer before workers block.
const WAIT_QUEUE: usize = 32;

/// Everything a command task needs, cheap to clone.
#[derive(Clone)]
struct Flows {
    chat: Arc<dyn ChatClient>,
    launcher: Arc<dyn SessionLauncher>,
    store: Arc<EnvFileStore>,
    env: SessionEnv,
    replies: ReplyHandle,
    bridge: BridgeSettings,
    configure_timeout: Option<Duration>,
}

pub struct Dispatcher {
    bus: Arc<MessageBus>,
    flows: Flows,
    waits: mpsc::Receiver<WaitRequest>,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<MessageBus>,
        chat: Arc<dyn ChatClient>,
        launcher: Arc<dyn SessionLauncher>,
        store: Arc<EnvFileStore>,
        bridge: BridgeSettings,
    ) -> Self {
        let (replies, waits) = ReplyRouter::channel(WAIT_QUEUE);
        Self {
            bus,
            flows: Flows {
                chat,
                launcher,
                store,
                env: SessionEnv::new(),
                replies,
                bridge,
                configure_timeout: None,
            },
            waits,
        }
    }

    /// Bound the API-key wait (unbounded by default).
    pub fn with_configure_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.flows.configure_timeout = timeout;
        self
    }

    /// Start from an existing environment mirror.
    pub fn with_session_env(mut self, env: SessionEnv) -> Self {
        self.flows.env = env;
        self
    }

    /// The environment mirror shared with command tasks.
    pub fn session_env(&self) -> SessionEnv {
        self.flows.env.clone()
    }

    /// Run until the bus closes.
    pub async fn run(mut self) {
        info!(commands = COMMANDS.len(), "dispatcher started");
        let mut router = ReplyRouter::new();

        loop {
            tokio::select! {
                // Waits are queued before their prompt is sent, so draining
                // them first means a reply never overtakes its wait.
                biased;

                Some(request) = self.waits.recv() => router.register(request),
                event = self.bus.consume() => match event {
                    Some(BusEvent::Command(interaction)) => self.dispatch(interaction),
                    Some(BusEvent::Message(msg)) => {
                        if let Some(unclaimed) = router.offer(msg) {
                            debug!(user = %unclaimed.sender_id, channel = %unclaimed.chat_id, "message not awaited");
                        }
                    }
                    None => break,
                },
            }
        }
        info!("dispatcher stopped, bus closed");
    }

    /// Defer, run the command on its own task, then report its outcome.
    fn dispatch(&self, interaction: Interaction) {
        info!(command = %interaction.command, user = %interaction.user_id, "dispatching command");
        let flows = self.flows.clone();

        tokio::spawn(async move {
            if let Err(e) = flows.chat.defer(&interaction).await {
                warn!(error = %e, command = %interaction.command, "failed to defer interaction");
            }

            let work = {
                let flows = flows.clone();
                let interaction = interaction.clone();
                tokio::spawn(async move { flows.run_command(&interaction).await })
            };

            let outcome = match work.await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    error!(error = %e, command = %interaction.command, user = %interaction.user_id, "command failed");
                    e.user_message()
                }
                Err(e) => {
                    error!(error = %e, command = %interaction.command, "command task panicked");
                    "Something went wrong while running that command.".to_string()
                }
            };

            if let Err(e) = flows.chat.followup(&interaction, &outcome).await {
                error!(error = %e, command = %interaction.command, "failed to send outcome follow-up");
            }
        });
    }
}

impl Flows {
    async fn run_command(&self, interaction: &Interaction) -> BridgeResult<String> {
        match interaction.command.as_str() {
            "configure_env" => {
                self.configurator().configure(interaction).await?;
                Ok(CONFIGURED_TEXT.to_string())
            }
            "undo_env" => Ok(self.configurator().undo().await?.to_string()),
            "summon" => self.summon(interaction).await,
            other => {
                warn!(command = other, "unknown command");
                Ok(format!("Unknown command: {other}"))
            }
        }
    }

    fn configurator(&self) -> Configurator {
        Configurator::new(
            self.chat.clone(),
            self.store.clone(),
            self.env.clone(),
            self.replies.clone(),
            self.configure_timeout,
        )
    }

    async fn summon(&self, interaction: &Interaction) -> BridgeResult<String> {
        let thread_id = if interaction.is_direct() {
            None
        } else {
            let name = format!("Temporary Thread - {}", generate_session_id());
            match self.chat.create_thread(&interaction.channel_id, &name).await {
                Ok(id) => {
                    info!(thread = %id, name = %name, "discussion thread created");
                    Some(id)
                }
                Err(e) => {
                    warn!(error = %e, channel = %interaction.channel_id, "failed to create discussion thread");
                    None
                }
            }
        };

        let bridge = SessionBridge::new(
            self.chat.clone(),
            self.launcher.clone(),
            self.replies.clone(),
            self.env.clone(),
            self.bridge.clone(),
        );
        let report = bridge.run(interaction, thread_id.as_deref()).await?;
        debug!(bytes = report.bytes_written, "summon finished");
        Ok(SUMMONED_TEXT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::GOAL_PROMPT;
    use crate::configurator::API_KEY_PROMPT;
    use crate::testing::{ChatCall, FakeLauncher, FakeState, RecordingChat};
    use leonidas_core::bus::types::{ChannelKind, InboundMessage};
    use leonidas_core::envfile::API_KEY_VAR;
    use leonidas_core::utils::is_session_id;
    use std::sync::atomic::Ordering;

    struct Harness {
        bus: Arc<MessageBus>,
        chat: Arc<RecordingChat>,
        state: Arc<FakeState>,
        env: SessionEnv,
        dir: tempfile::TempDir,
    }

    fn start(goal_timeout: Duration, launcher: FakeLauncher) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MessageBus::new(32));
        let chat = RecordingChat::new();
        let state = launcher.state.clone();
        let store = Arc::new(EnvFileStore::new(dir.path().join(".env")));
        let settings = BridgeSettings {
            scripted_input: "n\n".into(),
            startup_delay: Duration::ZERO,
            goal_timeout,
            relay_output: false,
        };
        let dispatcher = Dispatcher::new(bus.clone(), chat.clone(), Arc::new(launcher), store, settings);
        let env = dispatcher.session_env();
        tokio::spawn(dispatcher.run());
        Harness {
            bus,
            chat,
            state,
            env,
            dir,
        }
    }

    fn command(id: &str, name: &str) -> Interaction {
        Interaction::new(id, "tok", "chan1", "user1", name)
    }

    fn reply(text: &str) -> InboundMessage {
        InboundMessage::new("discord", "user1", "chan1", text)
    }

    fn has_followup(calls: &[ChatCall], text: &str) -> bool {
        calls
            .iter()
            .any(|c| matches!(c, ChatCall::Followup { content, .. } if content == text))
    }

    #[test]
    fn test_command_table() {
        let names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["configure_env", "summon", "undo_env"]);
        assert_eq!(COMMANDS[0].description, "Configure environment variables");
        assert_eq!(COMMANDS[1].description, "Summon the AI to execute a specific task");
    }

    #[tokio::test]
    async fn test_configure_env_end_to_end() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());

        h.bus.publish_command(command("ix1", "configure_env")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, API_KEY_PROMPT)).await;
        h.bus.publish_message(reply("sk-test123")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, CONFIGURED_TEXT)).await;

        let contents = std::fs::read_to_string(h.dir.path().join(".env")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "OPENAI_API_KEY=sk-test123");
        assert!(is_session_id(lines[1].strip_prefix("TERMINAL_THREAD_ID=").unwrap()));
        assert_eq!(h.env.get(API_KEY_VAR).as_deref(), Some("sk-test123"));

        assert_eq!(h.chat.defers(), 1);
        assert_eq!(h.chat.followups(), vec![API_KEY_PROMPT.to_string(), CONFIGURED_TEXT.to_string()]);
    }

    #[tokio::test]
    async fn test_summon_forwards_goal_then_reports() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());

        h.bus.publish_command(command("ix1", "summon")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, GOAL_PROMPT)).await;
        h.bus.publish_message(reply("write a poem")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, SUMMONED_TEXT)).await;

        // The outcome is only sent after the goal reached the terminal.
        assert_eq!(h.state.written(), "n\nwrite a poem\n");

        let calls = h.chat.calls();
        assert_eq!(calls[0], ChatCall::Defer { interaction: "ix1".into() });
        match &calls[1] {
            ChatCall::Thread { channel, name } => {
                assert_eq!(channel, "chan1");
                let id = name.strip_prefix("Temporary Thread - ").unwrap();
                assert!(is_session_id(id));
            }
            other => panic!("expected thread creation, got {other:?}"),
        }
        assert_eq!(h.chat.followups(), vec![GOAL_PROMPT.to_string(), SUMMONED_TEXT.to_string()]);
    }

    #[tokio::test]
    async fn test_summon_timeout_single_notice() {
        let h = start(Duration::from_millis(50), FakeLauncher::new());

        h.bus.publish_command(command("ix1", "summon")).await.unwrap();
        let notice = "You took too long to answer. Please try again.";
        h.chat.wait_until(|calls| has_followup(calls, notice)).await;

        // A late reply is not forwarded.
        h.bus.publish_message(reply("too late")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.state.written(), "n\n");
        assert!(h.state.killed.load(Ordering::SeqCst));
        let followups = h.chat.followups();
        assert_eq!(followups.iter().filter(|f| f.as_str() == notice).count(), 1);
        assert_eq!(followups, vec![GOAL_PROMPT.to_string(), notice.to_string()]);
        assert_eq!(h.chat.defers(), 1);
    }

    #[tokio::test]
    async fn test_failed_summon_still_one_outcome() {
        let h = start(
            Duration::from_secs(5),
            FakeLauncher {
                fail_launch: true,
                ..FakeLauncher::default()
            },
        );

        h.bus.publish_command(command("ix1", "summon")).await.unwrap();
        h.chat
            .wait_until(|calls| calls.iter().any(|c| matches!(c, ChatCall::Followup { .. })))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.chat.defers(), 1);
        let followups = h.chat.followups();
        assert_eq!(followups.len(), 1);
        assert!(followups[0].starts_with("Failed to launch the agent container"));
    }

    #[tokio::test]
    async fn test_thread_failure_does_not_abort_summon() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());
        h.chat.fail_threads.store(true, Ordering::SeqCst);

        h.bus.publish_command(command("ix1", "summon")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, GOAL_PROMPT)).await;
        h.bus.publish_message(reply("goal")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, SUMMONED_TEXT)).await;
    }

    #[tokio::test]
    async fn test_summon_in_dm_skips_thread() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());
        let mut ix = command("ix1", "summon");
        ix.channel_kind = ChannelKind::Direct;

        h.bus.publish_command(ix).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, GOAL_PROMPT)).await;
        h.bus.publish_message(reply("goal")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, SUMMONED_TEXT)).await;

        assert!(!h.chat.calls().iter().any(|c| matches!(c, ChatCall::Thread { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_configures_do_not_interleave() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());

        for i in 0..4 {
            let mut ix = command(&format!("ix{i}"), "configure_env");
            ix.user_id = format!("user{i}");
            h.bus.publish_command(ix).await.unwrap();
        }
        h.chat
            .wait_until(|calls| {
                calls
                    .iter()
                    .filter(|c| matches!(c, ChatCall::Followup { content, .. } if content == API_KEY_PROMPT))
                    .count()
                    == 4
            })
            .await;
        for i in 0..4 {
            let msg = InboundMessage::new("discord", format!("user{i}"), "chan1", format!("sk-{i}"));
            h.bus.publish_message(msg).await.unwrap();
        }
        h.chat
            .wait_until(|calls| {
                calls
                    .iter()
                    .filter(|c| matches!(c, ChatCall::Followup { content, .. } if content == CONFIGURED_TEXT))
                    .count()
                    == 4
            })
            .await;

        let contents = std::fs::read_to_string(h.dir.path().join(".env")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 8);
        for pair in lines.chunks(2) {
            assert!(pair[0].starts_with("OPENAI_API_KEY=sk-"));
            assert!(pair[1].starts_with("TERMINAL_THREAD_ID="));
        }
    }

    #[tokio::test]
    async fn test_undo_and_unknown_commands() {
        let h = start(Duration::from_secs(5), FakeLauncher::new());

        h.bus.publish_command(command("ix1", "undo_env")).await.unwrap();
        h.chat
            .wait_until(|calls| has_followup(calls, crate::configurator::NOTHING_TO_UNDO_TEXT))
            .await;

        h.bus.publish_command(command("ix2", "dance")).await.unwrap();
        h.chat.wait_until(|calls| has_followup(calls, "Unknown command: dance")).await;
        assert_eq!(h.chat.defers(), 2);
    }
}
