use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use tokio::runtime::RuntimeFlavor;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("can't spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("waiting for '{command}' failed: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
    #[error("can't duplicate redirect file: {0}")]
    Redirect(std::io::Error),
}

/// Spawns `<shell> -c <command>` with stdin closed.
#[derive(Debug)]
pub struct Executor {
    shell: String,
    redirect: Option<File>,
    env: Vec<(String, String)>,
    children: Vec<Child>,
}

impl Executor {
    pub fn new(shell: impl Into<String>, redirect: Option<File>) -> Self {
        Self {
            shell: shell.into(),
            redirect,
            env: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Open `path` for appending and use it as stdout and stderr of every
    /// command. Failures are logged and output is left alone.
    pub fn open_redirect(path: &Path) -> Option<File> {
        match File::options().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "can't open redirect file");
                None
            }
        }
    }

    /// Add a variable to the environment of every command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run `command`; when `sync` is set, wait for it to exit.
    pub fn run(&mut self, command: &str, sync: bool) -> Result<(), ExecError> {
        self.reap();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(file) = &self.redirect {
            cmd.stdout(file.try_clone().map_err(ExecError::Redirect)?);
            cmd.stderr(file.try_clone().map_err(ExecError::Redirect)?);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;
        debug!(pid = child.id(), command, sync, "spawned");

        if sync {
            // Keys stay queued on the event thread until the command exits.
            let status = wait_blocking(&mut child).map_err(|source| ExecError::Wait {
                command: command.to_string(),
                source,
            })?;
            debug!(command, %status, "finished");
        } else {
            self.children.push(child);
        }
        Ok(())
    }

    /// Collect children that have exited.
    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

/// Wait for `child`, moving the runtime's other tasks off this worker
/// when called from a multi-threaded runtime.
fn wait_blocking(child: &mut Child) -> std::io::Result<ExitStatus> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| child.wait())
        }
        _ => child.wait(),
    }
}
