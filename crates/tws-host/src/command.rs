//! Running short-lived external commands (tmux, directory pickers).
//!
//! Callers go through [`CommandRunner`] so tests can substitute canned
//! output for a real binary.

use std::io;
use std::process::{Command, Stdio};

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a program to completion and captures its output. Blocking.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs real processes via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Returns a fixed result and remembers every invocation.
    pub struct FakeRunner {
        result: Result<CommandOutput, io::ErrorKind>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        pub fn returning(output: CommandOutput) -> Self {
            Self {
                result: Ok(output),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn missing_binary() -> Self {
            Self {
                result: Err(io::ErrorKind::NotFound),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.result.clone().map_err(io::Error::from)
        }
    }
}
