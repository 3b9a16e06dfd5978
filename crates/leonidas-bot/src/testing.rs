//! Test doubles: a recording chat client and a scripted launcher.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use leonidas_channels::ChatClient;
use leonidas_core::bus::types::{Interaction, OutboundMessage};
use leonidas_core::error::{BridgeError, BridgeResult};

use crate::launcher::{AgentProcess, SessionLauncher};

/// One outbound chat call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatCall {
    Defer { interaction: String },
    Followup { interaction: String, content: String },
    Direct { user: String, content: String },
    Thread { channel: String, name: String },
    Send { chat_id: String, content: String },
}

#[derive(Default)]
pub struct RecordingChat {
    calls: Mutex<Vec<ChatCall>>,
    pub fail_threads: AtomicBool,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn followups(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Followup { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn defers(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChatCall::Defer { .. }))
            .count()
    }

    /// Poll until `pred` holds for the recorded calls, or panic after 5s.
    pub async fn wait_until(&self, pred: impl Fn(&[ChatCall]) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&self.calls()) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("condition not met; calls = {:?}", self.calls());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn push(&self, call: ChatCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn defer(&self, interaction: &Interaction) -> anyhow::Result<()> {
        self.push(ChatCall::Defer {
            interaction: interaction.id.clone(),
        });
        Ok(())
    }

    async fn followup(&self, interaction: &Interaction, content: &str) -> anyhow::Result<()> {
        self.push(ChatCall::Followup {
            interaction: interaction.id.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, content: &str) -> anyhow::Result<()> {
        self.push(ChatCall::Direct {
            user: user_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_thread(&self, channel_id: &str, name: &str) -> anyhow::Result<String> {
        if self.fail_threads.load(Ordering::SeqCst) {
            anyhow::bail!("missing permissions");
        }
        self.push(ChatCall::Thread {
            channel: channel_id.to_string(),
            name: name.to_string(),
        });
        Ok("thread-1".to_string())
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        self.push(ChatCall::Send {
            chat_id: msg.chat_id.clone(),
            content: msg.content.clone(),
        });
        Ok(())
    }
}

/// What a [`FakeLauncher`] did, shared with the test.
#[derive(Default)]
pub struct FakeState {
    pub written: Mutex<Vec<u8>>,
    pub env: Mutex<Vec<(String, String)>>,
    pub builds: AtomicUsize,
    pub killed: AtomicBool,
    pub detached: AtomicBool,
    pub output_taken: AtomicBool,
}

impl FakeState {
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }
}

/// Launcher that never touches docker.
#[derive(Default)]
pub struct FakeLauncher {
    pub state: Arc<FakeState>,
    pub fail_build: bool,
    pub fail_launch: bool,
    /// Bytes the fake process "prints".
    pub output: Vec<u8>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn build(&self) -> BridgeResult<()> {
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_build {
            return Err(BridgeError::Build {
                status: "exit status: 1".into(),
            });
        }
        Ok(())
    }

    async fn launch(&self, env: Vec<(String, String)>) -> BridgeResult<Box<dyn AgentProcess>> {
        if self.fail_launch {
            return Err(BridgeError::Launch("docker-compose not found".into()));
        }
        *self.state.env.lock().unwrap() = env;
        Ok(Box::new(FakeProcess {
            state: self.state.clone(),
            output: Some(self.output.clone()),
        }))
    }
}

struct FakeProcess {
    state: Arc<FakeState>,
    output: Option<Vec<u8>>,
}

#[async_trait]
impl AgentProcess for FakeProcess {
    async fn write(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        self.state.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.state.output_taken.store(true, Ordering::SeqCst);
        self.output
            .take()
            .map(|bytes| Box::new(std::io::Cursor::new(bytes)) as Box<dyn Read + Send>)
    }

    async fn kill(&mut self) -> BridgeResult<()> {
        self.state.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn detach(self: Box<Self>) {
        self.state.detached.store(true, Ordering::SeqCst);
    }
}
