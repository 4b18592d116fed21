use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::process::CommandRunner;

pub const SSH_KEYGEN: &str = "ssh-keygen";

pub fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut path: OsString = private_key_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Generate an unencrypted RSA key pair at `private_key_path` and
/// `<private_key_path>.pub`. An existing pair is kept as is; a lone half
/// is discarded and the pair regenerated.
pub fn generate_key_pair(runner: &dyn CommandRunner, private_key_path: &Path) -> Result<()> {
    let public_path = public_key_path(private_key_path);
    match (private_key_path.exists(), public_path.exists()) {
        (true, true) => {
            debug!(path = %private_key_path.display(), "reusing existing SSH key pair");
            return Ok(());
        }
        (false, false) => {}
        _ => {
            warn!(path = %private_key_path.display(), "discarding incomplete SSH key pair");
            // ssh-keygen would stop at its overwrite prompt otherwise.
            remove_if_exists(private_key_path)?;
            remove_if_exists(&public_path)?;
        }
    }

    let args = vec![
        "-t".to_string(),
        "rsa".to_string(),
        "-b".to_string(),
        "2048".to_string(),
        "-N".to_string(),
        String::new(),
        "-f".to_string(),
        private_key_path.display().to_string(),
        "-q".to_string(),
    ];
    let output = runner.run(SSH_KEYGEN, &args)?;
    if !output.success() {
        return Err(Error::KeyGeneration {
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
