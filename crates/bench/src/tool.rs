//! External tool invocation
//!
//! Every encoder, decoder, converter, probe and scorer is run synchronously
//! through a [`CommandRunner`]. A non-zero exit or a missing output value is a
//! [`ToolError`]; callers treat those as fatal for the whole run.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::fmt;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

use crate::template::{split_command, substitute, TemplateError, TemplateVars};

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.?\d*").expect("number pattern is valid"));

/// Error type for external tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status
    #[error("`{command}` failed with exit code {code}")]
    Failed { command: String, code: i32 },

    /// The program was terminated by a signal
    #[error("`{command}` was terminated by signal")]
    Terminated { command: String },

    /// The expected label was not found on the last output line
    #[error("no '{label}' value in output of `{command}`")]
    MissingValue { command: String, label: String },
}

impl ToolError {
    /// Command line of the failing invocation
    pub fn command(&self) -> &str {
        match self {
            ToolError::Spawn { command, .. }
            | ToolError::Failed { command, .. }
            | ToolError::Terminated { command }
            | ToolError::MissingValue { command, .. } => command,
        }
    }

    /// Exit status to terminate the process with
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolError::Failed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// A program plus its arguments, already split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Split a complete command line
    ///
    /// A program given as e.g. `dump_ssim -y` contributes its extra words as
    /// leading arguments.
    pub fn parse(line: &str) -> Result<Self, TemplateError> {
        let mut tokens = split_command(line)?.into_iter();
        let program = tokens.next().ok_or(TemplateError::Empty)?;
        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Expand a template with `vars`, then split it
    pub fn from_template(template: &str, vars: &TemplateVars) -> Result<Self, TemplateError> {
        Self::parse(&substitute(template, vars)?)
    }

    fn to_process(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Seam between the benchmark pipeline and the operating system
pub trait CommandRunner: Sync {
    /// Run to completion, output goes to the inherited stdio
    fn run(&self, cmd: &ToolCommand) -> Result<(), ToolError>;

    /// Run to completion and return stdout
    fn capture(&self, cmd: &ToolCommand) -> Result<String, ToolError>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

fn check_status(cmd: &ToolCommand, status: std::process::ExitStatus) -> Result<(), ToolError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ToolError::Failed {
            command: cmd.to_string(),
            code,
        }),
        None => Err(ToolError::Terminated {
            command: cmd.to_string(),
        }),
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<(), ToolError> {
        debug!("Running: {}", cmd);
        let status = cmd.to_process().status().map_err(|source| ToolError::Spawn {
            command: cmd.to_string(),
            source,
        })?;
        check_status(cmd, status)
    }

    fn capture(&self, cmd: &ToolCommand) -> Result<String, ToolError> {
        debug!("Capturing: {}", cmd);
        let output = cmd
            .to_process()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn {
                command: cmd.to_string(),
                source,
            })?;
        check_status(cmd, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Find the number printed right after `label` on the last non-empty line
pub fn extract_labelled_value(output: &str, label: &str) -> Option<f64> {
    let line = output.lines().rev().find(|line| !line.trim().is_empty())?;
    let start = line.find(label)? + label.len();
    let number = NUMBER.find(&line[start..])?;
    number.as_str().parse().ok()
}

/// Run `cmd`, capture stdout and extract the value after `label`
pub fn capture_value<R: CommandRunner + ?Sized>(
    runner: &R,
    cmd: &ToolCommand,
    label: &str,
) -> Result<f64, ToolError> {
    let output = runner.capture(cmd)?;
    extract_labelled_value(&output, label).ok_or_else(|| ToolError::MissingValue {
        command: cmd.to_string(),
        label: label.to_string(),
    })
}

/// Check a tool is installed by running `<program> -version`
pub fn check_tool_available<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
) -> Result<(), ToolError> {
    runner.capture(&ToolCommand::new(program).arg("-version"))?;
    Ok(())
}
