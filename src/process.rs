use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::error::{HarnessError, HarnessResult};

/// A single external command with an explicit, minimal environment.
///
/// The spawned process does not inherit the harness environment: only
/// variables added through [`Exec::env`] are visible to it, so its behaviour
/// cannot vary with ambient host configuration. This layer performs no
/// retries; retry policy, if any, belongs to the caller.
#[derive(Debug, Clone)]
pub struct Exec {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl Exec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Command name used in error messages.
    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn command(&self, stdout: Stdio, stderr: Stdio) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        command
    }

    /// Run to completion. A non-zero exit becomes an error naming the
    /// command and carrying its captured stderr.
    pub async fn run(&self) -> HarnessResult<()> {
        let output = self.command(Stdio::null(), Stdio::piped()).output().await?;
        if output.status.success() {
            return Ok(());
        }
        Err(HarnessError::CommandFailed {
            command: self.name(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run to completion and report the exit status without judging it.
    /// Callers that interpret exit codes themselves use this form.
    pub async fn exit_status(&self) -> HarnessResult<ExitStatus> {
        let status = self.command(Stdio::null(), Stdio::null()).status().await?;
        Ok(status)
    }

    /// Launch as a background child with stdout and stderr appended to
    /// `log`. The handle kills the child when dropped, so a retained handle
    /// cannot outlive the scenario that spawned it.
    pub fn spawn(&self, log: &Path) -> HarnessResult<Child> {
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)?;
        let stderr = stdout.try_clone()?;
        let mut command = self.command(Stdio::from(stdout), Stdio::from(stderr));
        command.kill_on_drop(true);
        Ok(command.spawn()?)
    }
}
