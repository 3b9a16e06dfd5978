//! PTY-attached child process.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use leonidas_core::error::{BridgeError, BridgeResult};

use crate::launcher::AgentProcess;

/// A child running on the slave end of a pseudo-terminal.
///
/// Keeps the master end alive for as long as the value lives; dropping the
/// master hangs up the child's terminal.
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    reader: Option<Box<dyn Read + Send>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    exit: JoinHandle<std::io::Result<ExitStatus>>,
}

impl PtyProcess {
    /// Open a PTY pair and spawn `program args..` on it. Blocking.
    pub fn spawn(
        program: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> BridgeResult<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Launch(e.to_string()))?;
        // The child holds its own copy; ours would keep the reader from seeing EOF.
        drop(pair.slave);

        let killer = child.clone_killer();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let pid = child.process_id();
        let exit = tokio::task::spawn_blocking(move || child.wait());
        debug!(pid = ?pid, program = program, "pty child spawned");

        Ok(Self {
            master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            reader: Some(reader),
            killer,
            exit,
        })
    }
}

#[async_trait]
impl AgentProcess for PtyProcess {
    async fn write(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        let writer = self.writer.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().unwrap_or_else(|e| e.into_inner());
            guard.write_all(&bytes)?;
            guard.flush()
        })
        .await
        .map_err(|e| BridgeError::Pty(e.to_string()))?
        .map_err(|e| BridgeError::Pty(e.to_string()))
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    async fn kill(&mut self) -> BridgeResult<()> {
        match self.killer.kill() {
            Ok(()) => Ok(()),
            // Already gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Pty(e.to_string())),
        }
    }

    fn detach(self: Box<Self>) {
        let PtyProcess {
            master,
            writer,
            reader,
            killer,
            exit,
        } = *self;
        tokio::spawn(async move {
            match exit.await {
                Ok(Ok(status)) => info!(code = status.exit_code(), "agent container exited"),
                Ok(Err(e)) => warn!(error = %e, "failed to wait for agent container"),
                Err(e) => warn!(error = %e, "agent container waiter panicked"),
            }
            drop((master, writer, reader, killer));
        });
    }
}
