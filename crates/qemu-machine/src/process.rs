use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};

/// Substring the qemu tools print on stderr for fatal conditions, sometimes
/// while still exiting 0.
///
/// Matching on it is brittle and depends on the tool version, but dropping the
/// check would let real startup failures pass as success.
pub const STDERR_ERROR_MARKER: &str = "error:";

/// Captured result of an external command. stdout and stderr are kept apart
/// so boot chatter on one stream is never mistaken for a failure on the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn reports_error(&self) -> bool {
        self.stderr.contains(STDERR_ERROR_MARKER)
    }

    /// Classify the run. An `error:` line on stderr is a failure whatever the
    /// exit status; otherwise a non-zero status is.
    pub fn check(self, program: &str, args: &[String]) -> Result<CommandOutput> {
        if self.reports_error() {
            return Err(Error::ProcessReported {
                program: program.to_string(),
                args: args.join(" "),
                stdout: self.stdout,
                stderr: self.stderr,
            });
        }
        if !self.success() {
            return Err(Error::ProcessFailed {
                program: program.to_string(),
                code: self.code,
                stdout: self.stdout,
                stderr: self.stderr,
            });
        }
        Ok(self)
    }
}

/// Runs external programs to completion and hands back their output.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("executing: {} {}", program, args.join(" "));

        let output = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ExecutableNotFound {
                    program: program.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(code = ?output.code, stdout = %output.stdout, stderr = %output.stderr, "{} finished", program);
        Ok(output)
    }
}
