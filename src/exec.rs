// src/exec.rs

//! External command execution
//!
//! The ingestion pipeline shells out to `mount`, `umount` and `rsync`. All of
//! it goes through the `ProcessRunner` trait so tests can script command
//! results instead of touching the system.

use crate::error::{Error, Result};
use std::process::Command;
use tracing::debug;

/// Captured result of one external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    /// Convenience constructor for scripted results in tests
    pub fn new(returncode: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            returncode,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands and captures their output
pub trait ProcessRunner {
    /// Run `argv[0]` with `argv[1..]` as arguments, blocking until exit.
    fn run(&self, argv: &[&str]) -> Result<CommandOutput>;
}

/// `ProcessRunner` backed by `std::process::Command`
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Other("empty command line".to_string()))?;

        debug!("exec: {}", argv.join(" "));

        let output = Command::new(program).args(args).output()?;

        let result = CommandOutput {
            returncode: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("exec: {} exited {}", program, result.returncode);
        Ok(result)
    }
}
