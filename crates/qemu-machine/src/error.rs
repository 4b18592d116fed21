use std::io;
use std::path::PathBuf;

/// Failures surfaced by driver operations.
///
/// Every step aborts its enclosing operation with one of these and nothing is
/// retried. Variants that come from an external tool carry its stdout and
/// stderr verbatim so the caller can diagnose without re-running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read public key {}: {source}", .path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write seed archive: {0}")]
    ArchiveWrite(#[source] io::Error),

    #[error("qemu-img convert failed\nstdout: {stdout}\nstderr: {stderr}")]
    Conversion { stdout: String, stderr: String },

    #[error("qemu-img resize failed\nstdout: {stdout}\nstderr: {stderr}")]
    Resize { stdout: String, stderr: String },

    #[error("failed to allocate an ephemeral port: {0}")]
    PortAllocation(#[source] io::Error),

    #[error("{program} not found in PATH (is it installed?)")]
    ExecutableNotFound { program: String },

    #[error("{program} {args} failed: {stderr}\nstdout: {stdout}")]
    ProcessReported {
        program: String,
        args: String,
        stdout: String,
        stderr: String,
    },

    #[error("{program} exited with {}\nstdout: {stdout}\nstderr: {stderr}", exit_code_label(.code))]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{operation} is not supported by the qemu driver")]
    Unsupported { operation: &'static str },

    #[error("ssh-keygen failed\nstdout: {stdout}\nstderr: {stderr}")]
    KeyGeneration { stdout: String, stderr: String },

    #[error("boot image: {0}")]
    BootImage(String),

    #[error("invalid value '{value}' for {option} (expected one of: {expected})")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
