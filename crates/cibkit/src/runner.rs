//! External command execution.
//!
//! The [`Runner`] trait is the only way this crate reaches the cluster, so
//! tests can swap the real tools for a scripted fake. A nonzero exit status
//! is never an error at this layer: it is returned in [`CommandResult`] and
//! callers branch on it.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A program and its ordered argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandLine {
    /// Start a command line for `program`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `<prefix><path>` as a single argument, e.g. `diff-against=/x`.
    pub fn arg_joined(self, prefix: &str, path: &Path) -> Self {
        let mut joined = OsString::from(prefix);
        joined.push(path.as_os_str());
        self.arg(joined)
    }

    /// The program to execute.
    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// The argument list.
    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments as lossy strings, mostly for matching in tests.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// File name of the program (`pcs`, `crm_diff`, ...).
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured outcome of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, or -1 when killed by a signal.
    pub fn status(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// Stdout followed by stderr, the way a `2>&1` capture would read.
    pub fn output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut out = self.stdout.clone();
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
                out
            }
        }
    }
}

/// Executes external commands.
pub trait Runner {
    /// Run a command to completion and capture its output.
    ///
    /// Only a failure to start the process is an error.
    fn run(&self, command: &CommandLine) -> Result<CommandResult>;
}

/// Runner that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandResult> {
        let output = Command::new(command.program())
            .args(command.arg_list())
            .output()
            .map_err(|e| Error::Spawn {
                command: command.to_string(),
                source: e,
            })?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}
