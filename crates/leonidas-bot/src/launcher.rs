//! Container launcher — builds the agent image and starts it on a PTY.
//!
//! The bridge only talks to the [`SessionLauncher`] / [`AgentProcess`]
//! traits; [`ComposeLauncher`] is the docker-compose implementation.

use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use leonidas_core::config::AgentConfig;
use leonidas_core::error::{BridgeError, BridgeResult};

use crate::pty::PtyProcess;

/// Builds and starts the agent container.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Build the container image. A non-zero exit is a `Build` error.
    async fn build(&self) -> BridgeResult<()>;

    /// Start the container attached to a fresh pseudo-terminal, with `env`
    /// exported to the child.
    async fn launch(&self, env: Vec<(String, String)>) -> BridgeResult<Box<dyn AgentProcess>>;
}

/// A running agent process.
#[async_trait]
pub trait AgentProcess: Send {
    /// Write raw bytes to the terminal input.
    async fn write(&mut self, bytes: &[u8]) -> BridgeResult<()>;

    /// Take the terminal output stream (once).
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>>;

    async fn kill(&mut self) -> BridgeResult<()>;

    /// Stop driving the process and supervise it until it exits.
    fn detach(self: Box<Self>);
}

// ─────────────────────────────────────────────
// ComposeLauncher
// ─────────────────────────────────────────────

/// Runs `docker-compose build` / `docker-compose run` in the project directory.
#[derive(Clone, Debug)]
pub struct ComposeLauncher {
    program: String,
    build_args: Vec<String>,
    run_args: Vec<String>,
    project_dir: PathBuf,
}

impl ComposeLauncher {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            program: config.compose_program.clone(),
            build_args: config.build_args.clone(),
            run_args: config.run_args.clone(),
            project_dir: config.project_path(),
        }
    }

    /// Human-readable command line, for logs.
    pub fn describe(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl SessionLauncher for ComposeLauncher {
    async fn build(&self) -> BridgeResult<()> {
        info!(
            command = %self.describe(&self.build_args),
            dir = %self.project_dir.display(),
            "building agent image"
        );
        let status = Command::new(&self.program)
            .args(&self.build_args)
            .current_dir(&self.project_dir)
            .status()
            .await
            .map_err(BridgeError::BuildSpawn)?;

        if !status.success() {
            return Err(BridgeError::Build {
                status: status.to_string(),
            });
        }
        debug!("agent image built");
        Ok(())
    }

    async fn launch(&self, env: Vec<(String, String)>) -> BridgeResult<Box<dyn AgentProcess>> {
        info!(
            command = %self.describe(&self.run_args),
            dir = %self.project_dir.display(),
            env_vars = env.len(),
            "launching agent container"
        );
        let program = self.program.clone();
        let args = self.run_args.clone();
        let cwd = self.project_dir.clone();

        let process = tokio::task::spawn_blocking(move || PtyProcess::spawn(&program, &args, &cwd, &env))
            .await
            .map_err(|e| BridgeError::Launch(e.to_string()))??;
        Ok(Box::new(process))
    }
}
