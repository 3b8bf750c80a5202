//! Process launching. [`ShellRunner`] is the only place a child process is spawned.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::TaskError;

/// Runs one command to completion, sending its output to `log`. Blocks the calling worker
/// until the child exits; there is no timeout.
pub trait CommandRunner: Send + Sync {
    /// Returns the exit code.
    fn run(
        &self,
        command: &str,
        workdir: &Path,
        env: &[(String, String)],
        log: &File,
    ) -> Result<i32, TaskError>;
}

/// `sh -c <command>` in `workdir`, with `env` layered over the inherited environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(
        &self,
        command: &str,
        workdir: &Path,
        env: &[(String, String)],
        log: &File,
    ) -> Result<i32, TaskError> {
        let spawn_err = |source| TaskError::Spawn {
            command: command.to_string(),
            source,
        };
        let stdout = log.try_clone().map_err(spawn_err)?;
        let stderr = log.try_clone().map_err(spawn_err)?;

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(spawn_err)?;

        status.code().ok_or(TaskError::Killed)
    }
}

/// Environment for the external tools: `PRESTO` set, its `bin` and `lib` prepended to the
/// search paths.
pub fn tool_env(presto_root: Option<&Path>) -> Vec<(String, String)> {
    let Some(root) = presto_root else {
        return Vec::new();
    };
    let prepend = |var: &str, sub: &str| {
        let dir = root.join(sub).display().to_string();
        match std::env::var(var) {
            Ok(old) if !old.is_empty() => format!("{dir}:{old}"),
            _ => dir,
        }
    };
    vec![
        ("PRESTO".to_string(), root.display().to_string()),
        ("PATH".to_string(), prepend("PATH", "bin")),
        ("LD_LIBRARY_PATH".to_string(), prepend("LD_LIBRARY_PATH", "lib")),
    ]
}
