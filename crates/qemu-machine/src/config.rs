use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_MEMORY_MB: u64 = 1024;
pub const DEFAULT_DISK_SIZE_MB: u64 = 20000;
pub const DEFAULT_CPU_COUNT: u32 = 1;
pub const DEFAULT_NETWORK: &str = "default";
pub const DEFAULT_SSH_USER: &str = "docker";
pub const DEFAULT_SSH_PORT: u16 = 22;

pub const ISO_FILENAME: &str = "boot2docker.iso";
pub const DISK_FILENAME: &str = "disk.qcow2";
pub const SSH_KEY_FILENAME: &str = "id_rsa";
pub const PID_FILENAME: &str = "qemu.pid";

/// Disk cache mode passed to qemu's `-drive cache=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Leave the choice to qemu.
    #[default]
    Default,
    None,
    Writethrough,
    Writeback,
    Directsync,
    Unsafe,
}

impl CacheMode {
    pub const ALL: [CacheMode; 6] = [
        CacheMode::Default,
        CacheMode::None,
        CacheMode::Writethrough,
        CacheMode::Writeback,
        CacheMode::Directsync,
        CacheMode::Unsafe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::Default => "default",
            CacheMode::None => "none",
            CacheMode::Writethrough => "writethrough",
            CacheMode::Writeback => "writeback",
            CacheMode::Directsync => "directsync",
            CacheMode::Unsafe => "unsafe",
        }
    }
}

impl FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::InvalidOption {
                option: "cache mode",
                value: s.to_string(),
                expected: CacheMode::ALL.map(CacheMode::as_str).join(", "),
            })
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disk IO mode passed to qemu's `-drive aio=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    #[default]
    Threads,
    Native,
}

impl IoMode {
    pub const ALL: [IoMode; 2] = [IoMode::Threads, IoMode::Native];

    pub fn as_str(self) -> &'static str {
        match self {
            IoMode::Threads => "threads",
            IoMode::Native => "native",
        }
    }
}

impl FromStr for IoMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IoMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::InvalidOption {
                option: "io mode",
                value: s.to_string(),
                expected: IoMode::ALL.map(IoMode::as_str).join(", "),
            })
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag values handed over by the caller at configuration time.
///
/// The enum-valued options stay as strings here; they are validated when
/// applied to a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub memory_mb: u64,
    pub disk_size_mb: u64,
    pub cpu_count: u32,
    pub network: String,
    pub boot2docker_url: String,
    pub cache_mode: String,
    pub io_mode: String,
    pub ssh_user: String,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            memory_mb: DEFAULT_MEMORY_MB,
            disk_size_mb: DEFAULT_DISK_SIZE_MB,
            cpu_count: DEFAULT_CPU_COUNT,
            network: DEFAULT_NETWORK.to_string(),
            boot2docker_url: String::new(),
            cache_mode: CacheMode::default().to_string(),
            io_mode: IoMode::default().to_string(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
        }
    }
}

/// Everything needed to create and boot one machine. Fixed once the machine
/// is created, except for the SSH port recorded at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine_name: String,
    pub store_path: PathBuf,
    pub memory_mb: u64,
    pub disk_size_mb: u64,
    pub cpu_count: u32,
    pub network: String,
    pub boot2docker_url: String,
    pub boot_image_path: PathBuf,
    pub cache_mode: CacheMode,
    pub io_mode: IoMode,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub disk_path: PathBuf,
}

impl MachineConfig {
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        MachineConfig {
            machine_name: machine_name.into(),
            memory_mb: DEFAULT_MEMORY_MB,
            disk_size_mb: DEFAULT_DISK_SIZE_MB,
            cpu_count: DEFAULT_CPU_COUNT,
            network: DEFAULT_NETWORK.to_string(),
            boot2docker_url: String::new(),
            boot_image_path: store_path.join(ISO_FILENAME),
            cache_mode: CacheMode::default(),
            io_mode: IoMode::default(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
            ssh_port: DEFAULT_SSH_PORT,
            disk_path: store_path.join(DISK_FILENAME),
            store_path,
        }
    }

    pub fn resolve_store_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.store_path.join(file)
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.resolve_store_path(SSH_KEY_FILENAME)
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.resolve_store_path(PID_FILENAME)
    }
}
