use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::error::{BridgeError, EngineExit};

/// One running decoding engine and its three standard channels.
///
/// Each channel can be taken exactly once; the bridge hands them to the
/// tasks that feed, drain and watch the engine.
pub struct EngineProcess {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: Option<EngineExit>,
    killed: bool,
}

impl EngineProcess {
    /// Start the engine with no arguments and all channels piped.
    pub fn spawn(path: &Path) -> Result<Self, BridgeError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                path: path.display().to_string(),
                source,
            })?;

        debug!("spawned decoding engine {} (pid {:?})", path.display(), child.id());

        Ok(Self {
            path: path.to_path_buf(),
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            exit: None,
            killed: false,
        })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the engine to exit. Cancel safe.
    pub async fn wait(&mut self) -> std::io::Result<EngineExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait().await?;
        let exit = EngineExit::from_status(status);
        debug!("decoding engine {} {}", self.path.display(), exit);
        self.exit = Some(exit);
        Ok(exit)
    }

    /// Send a kill signal unless the engine already exited or was already killed.
    pub fn kill(&mut self) {
        if self.killed || self.exit.is_some() {
            return;
        }
        self.killed = true;
        if let Err(e) = self.child.start_kill() {
            warn!("cannot kill decoding engine {}: {}", self.path.display(), e);
        } else {
            debug!("killed decoding engine {}", self.path.display());
        }
    }
}
