use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use qemu_machine::{
    CacheMode, DriverOptions, IoMode, DEFAULT_CPU_COUNT, DEFAULT_DISK_SIZE_MB, DEFAULT_MEMORY_MB,
    DEFAULT_NETWORK, DEFAULT_SSH_USER,
};

#[derive(clap::Args)]
pub(crate) struct CreateArgs {
    /// Size of memory for host in MB
    #[arg(long = "qemu-memory", default_value_t = DEFAULT_MEMORY_MB)]
    pub memory: u64,

    /// Size of disk for host in MB
    #[arg(long = "qemu-disk-size", default_value_t = DEFAULT_DISK_SIZE_MB)]
    pub disk_size: u64,

    /// Number of CPUs
    #[arg(long = "qemu-cpu-count", default_value_t = DEFAULT_CPU_COUNT)]
    pub cpu_count: u32,

    /// Name of network to connect to
    #[arg(long = "qemu-network", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// The URL of the boot2docker image. Defaults to the latest available version
    #[arg(long = "qemu-boot2docker-url", env = "KVM_BOOT2DOCKER_URL", default_value = "")]
    pub boot2docker_url: String,

    /// Disk cache mode: default, none, writethrough, writeback, directsync, or unsafe
    #[arg(long = "qemu-cache-mode", default_value_t = CacheMode::Default)]
    pub cache_mode: CacheMode,

    /// Disk IO mode: threads, native
    #[arg(long = "qemu-io-mode", default_value_t = IoMode::Threads)]
    pub io_mode: IoMode,

    /// SSH username
    #[arg(long = "qemu-ssh-user", env = "KVM_SSH_USER", default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,
}

impl CreateArgs {
    pub(crate) fn to_options(&self) -> DriverOptions {
        DriverOptions {
            memory_mb: self.memory,
            disk_size_mb: self.disk_size,
            cpu_count: self.cpu_count,
            network: self.network.clone(),
            boot2docker_url: self.boot2docker_url.clone(),
            cache_mode: self.cache_mode.to_string(),
            io_mode: self.io_mode.to_string(),
            ssh_user: self.ssh_user.clone(),
        }
    }
}

#[derive(Parser)]
#[command(name = "qemu-machine", about = "Docker host VM on qemu", version)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Directory holding one sub-directory per machine
    #[arg(long, global = true, env = "MACHINE_STORAGE_PATH")]
    pub storage_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Create a machine: fetch the boot image, generate SSH keys, build the disk
    Create {
        /// Machine name
        name: String,

        #[command(flatten)]
        flags: CreateArgs,
    },

    /// Boot a created machine
    Start {
        /// Machine name
        name: String,
    },

    /// Stop a machine (not supported by this driver)
    Stop {
        /// Machine name
        name: String,
    },

    /// Restart a machine (not supported by this driver)
    Restart {
        /// Machine name
        name: String,
    },

    /// Kill a machine (not supported by this driver)
    Kill {
        /// Machine name
        name: String,
    },

    /// Upgrade a machine (not supported by this driver)
    Upgrade {
        /// Machine name
        name: String,
    },

    /// Remove a machine and its store directory
    Rm {
        /// Machine name
        name: String,
    },

    /// Print the machine's IP address
    Ip {
        /// Machine name
        name: String,
    },

    /// Print the Docker daemon URL
    Url {
        /// Machine name
        name: String,
    },

    /// Print the machine state
    Status {
        /// Machine name
        name: String,
    },

    /// Print the stored machine configuration as JSON
    Inspect {
        /// Machine name
        name: String,
    },
}
