use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::boot_image;
use crate::config::{
    CacheMode, DriverOptions, IoMode, MachineConfig, DEFAULT_SSH_PORT, DEFAULT_SSH_USER,
};
use crate::error::{Error, Result};
use crate::launcher;
use crate::process::{CommandRunner, SystemRunner};
use crate::seed;
use crate::ssh;
use crate::DOCKER_PORT;

pub const DRIVER_NAME: &str = "qemu";

/// Coarse machine state as far as this driver can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MachineState {
    /// Never started from this store.
    None,
    Running,
    Stopped,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::None => "None",
            MachineState::Running => "Running",
            MachineState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Lifecycle operations for one qemu-backed Docker host.
///
/// Operations are blocking and meant to be called one at a time per machine.
pub struct Driver {
    config: MachineConfig,
    runner: Box<dyn CommandRunner>,
}

impl Driver {
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self::from_config(MachineConfig::new(machine_name, store_path))
    }

    /// Rebuild a driver around a configuration persisted by the caller.
    pub fn from_config(config: MachineConfig) -> Self {
        Self::with_runner(config, Box::new(SystemRunner))
    }

    pub fn with_runner(config: MachineConfig, runner: Box<dyn CommandRunner>) -> Self {
        Driver { config, runner }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    pub fn set_config_from_flags(&mut self, options: &DriverOptions) -> Result<()> {
        debug!("SetConfigFromFlags called");
        let cache_mode = options.cache_mode.parse::<CacheMode>()?;
        let io_mode = options.io_mode.parse::<IoMode>()?;

        let config = &mut self.config;
        config.memory_mb = options.memory_mb;
        config.disk_size_mb = options.disk_size_mb;
        config.cpu_count = options.cpu_count;
        config.network = options.network.clone();
        config.boot2docker_url = options.boot2docker_url.clone();
        config.cache_mode = cache_mode;
        config.io_mode = io_mode;
        config.ssh_user = options.ssh_user.clone();
        config.ssh_port = DEFAULT_SSH_PORT;
        Ok(())
    }

    pub fn pre_create_check(&self) -> Result<()> {
        fs::create_dir_all(&self.config.store_path)?;
        Ok(())
    }

    /// Fetch the boot ISO, generate the SSH key pair and build the seeded
    /// disk. Must run once per machine.
    pub fn create(&mut self) -> Result<()> {
        fs::create_dir_all(&self.config.store_path)?;

        boot_image::ensure_boot_image(&self.config.boot2docker_url, &self.config.boot_image_path)?;

        info!("Creating SSH key...");
        let key_path = self.config.ssh_key_path();
        ssh::generate_key_pair(self.runner.as_ref(), &key_path)?;

        info!("Creating disk image...");
        seed::build_seed_disk(
            self.runner.as_ref(),
            &ssh::public_key_path(&key_path),
            &self.config.disk_path,
            self.config.disk_size_mb,
        )
    }

    /// Boot the machine and record the host port forwarded to guest SSH.
    pub fn start(&mut self) -> Result<()> {
        let port = launcher::start(self.runner.as_ref(), &self.config)?;
        self.config.ssh_port = port;
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        Err(Error::Unsupported { operation: "stop" })
    }

    pub fn restart(&self) -> Result<()> {
        Err(Error::Unsupported {
            operation: "restart",
        })
    }

    pub fn kill(&self) -> Result<()> {
        Err(Error::Unsupported { operation: "kill" })
    }

    pub fn upgrade(&self) -> Result<()> {
        Err(Error::Unsupported {
            operation: "upgrade",
        })
    }

    pub fn start_docker(&self) -> Result<()> {
        Err(Error::Unsupported {
            operation: "start docker",
        })
    }

    pub fn stop_docker(&self) -> Result<()> {
        Err(Error::Unsupported {
            operation: "stop docker",
        })
    }

    /// Delete the disk images and pid file. The store directory, keys and ISO
    /// belong to the caller.
    pub fn remove(&self) -> Result<()> {
        for path in [
            self.config.disk_path.clone(),
            seed::raw_image_path(&self.config.disk_path),
            self.config.pid_file_path(),
        ] {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    /// IP discovery is left to the caller; the driver never knows an address.
    pub fn get_ip(&self) -> Result<Option<String>> {
        Ok(None)
    }

    pub fn get_url(&self) -> Result<Option<String>> {
        let ip = match self.get_ip() {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Failed to get IP: {}", e);
                return Err(e);
            }
        };
        Ok(ip
            .filter(|ip| !ip.is_empty())
            .map(|ip| docker_url(&ip)))
    }

    /// Reads the pid qemu left behind and probes it with signal 0.
    pub fn get_state(&self) -> Result<MachineState> {
        let pid_file = self.config.pid_file_path();
        let contents = match fs::read_to_string(&pid_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MachineState::None),
            Err(e) => return Err(e.into()),
        };

        let pid = match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Pid::from_raw(pid),
            _ => {
                warn!(path = %pid_file.display(), "ignoring malformed pid file");
                return Ok(MachineState::Stopped);
            }
        };

        match kill(pid, None) {
            // EPERM: alive, but owned by another user.
            Ok(()) | Err(Errno::EPERM) => Ok(MachineState::Running),
            Err(Errno::ESRCH) => Ok(MachineState::Stopped),
            Err(e) => Err(io::Error::from(e).into()),
        }
    }

    pub fn get_machine_name(&self) -> &str {
        &self.config.machine_name
    }

    pub fn get_ssh_hostname(&self) -> Result<Option<String>> {
        self.get_ip()
    }

    pub fn get_ssh_port(&self) -> u16 {
        match self.config.ssh_port {
            0 => DEFAULT_SSH_PORT,
            port => port,
        }
    }

    pub fn get_ssh_username(&self) -> &str {
        if self.config.ssh_user.is_empty() {
            DEFAULT_SSH_USER
        } else {
            &self.config.ssh_user
        }
    }

    pub fn get_ssh_key_path(&self) -> PathBuf {
        self.config.ssh_key_path()
    }

    pub fn resolve_store_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.config.resolve_store_path(file)
    }
}

pub fn docker_url(ip: &str) -> String {
    format!("tcp://{}:{}", ip, DOCKER_PORT)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
