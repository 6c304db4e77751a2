// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Every external program nvstrap runs is described by a [`CommandSpec`], a
//! plain argument vector that is executed directly without going through a
//! shell. Execution itself sits behind the [`Runner`] trait, so callers can
//! inspect what would be run without running it.

use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

/// Typed description of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub sudo: bool,
}

impl CommandSpec {
    /// Construct new command description for target program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            sudo: false,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Request elevated privileges.
    ///
    /// The runner decides whether `sudo` is actually needed, e.g., it is
    /// skipped when already running as root.
    pub fn with_sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Full argument vector, optionally prefixed by `sudo`.
    pub fn argv(&self, elevate: bool) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if self.sudo && elevate {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl Display for CommandSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.argv(true).join(" "))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Successful output with given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout and stderr joined into one message.
    pub fn message(&self) -> String {
        let mut message = String::new();
        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        message
            .strip_suffix("\r\n")
            .or(message.strip_suffix('\n'))
            .map(ToString::to_string)
            .unwrap_or(message)
    }

    /// Turn unsuccessful output into an error.
    ///
    /// # Errors
    ///
    /// - Return [`CommandError::Failed`] if command did not succeed.
    pub fn into_result(self, cmd: &CommandSpec) -> Result<Self> {
        if self.success {
            return Ok(self);
        }

        Err(CommandError::Failed {
            command: cmd.to_string(),
            message: self.message(),
        })
    }
}

/// Layer of indirection for running external programs.
pub trait Runner: Send + Sync {
    /// Run command to completion, capturing its output.
    ///
    /// A command that runs but exits unsuccessfully is not an error here.
    fn run(&self, cmd: &CommandSpec) -> Result<Output>;

    /// Run command attached to the current terminal.
    fn run_interactive(&self, cmd: &CommandSpec) -> Result<()>;

    /// Locate program on the search path.
    fn locate(&self, name: &str) -> Option<PathBuf>;

    /// Check if program can be found on the search path.
    fn has_program(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    /// Run command, treating unsuccessful exit as an error.
    fn run_checked(&self, cmd: &CommandSpec) -> Result<Output> {
        self.run(cmd)?.into_result(cmd)
    }
}

/// Runner that executes commands on the host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    elevate: bool,
}

impl SystemRunner {
    /// Construct new host runner.
    ///
    /// Figures out once whether `sudo` is needed for privileged commands.
    pub fn new() -> Self {
        let is_root = Command::new("id")
            .arg("-u")
            .output()
            .map(|output| String::from_utf8_lossy(&output.stdout).trim() == "0")
            .unwrap_or(false);

        Self { elevate: !is_root }
    }

    fn command(&self, cmd: &CommandSpec) -> Command {
        let argv = cmd.argv(self.elevate);
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for SystemRunner {
    #[instrument(skip(self, cmd), fields(cmd = %cmd), level = "debug")]
    fn run(&self, cmd: &CommandSpec) -> Result<Output> {
        let output = self
            .command(cmd)
            .stdin(Stdio::inherit())
            .output()
            .map_err(|err| CommandError::Spawn {
                source: err,
                program: cmd.program.clone(),
            })?;

        let output = Output {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        };
        debug!("exit success: {}", output.success);

        Ok(output)
    }

    #[instrument(skip(self, cmd), fields(cmd = %cmd), level = "debug")]
    fn run_interactive(&self, cmd: &CommandSpec) -> Result<()> {
        let status = self
            .command(cmd)
            .spawn()
            .and_then(|mut child| child.wait())
            .map_err(|err| CommandError::Spawn {
                source: err,
                program: cmd.program.clone(),
            })?;

        if !status.success() {
            return Err(CommandError::Failed {
                command: cmd.to_string(),
                message: format!("exited with {status}"),
            });
        }

        Ok(())
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(OsStr::new(name)).ok()
    }
}

/// Command execution error types.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Program could not be started at all.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Program ran but did not succeed.
    #[error("command {command:?} failed:\n{message}")]
    Failed { command: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = CommandError> = std::result::Result<T, E>;
