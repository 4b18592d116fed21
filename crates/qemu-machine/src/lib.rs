#![forbid(unsafe_code)]

mod boot_image;
mod config;
mod driver;
mod error;
mod launcher;
mod port;
mod process;
mod seed;
mod ssh;

pub use boot_image::{ensure_boot_image, BootImageSource};
pub use config::{
    CacheMode, DriverOptions, IoMode, MachineConfig, DEFAULT_CPU_COUNT, DEFAULT_DISK_SIZE_MB,
    DEFAULT_MEMORY_MB, DEFAULT_NETWORK, DEFAULT_SSH_USER, DISK_FILENAME, ISO_FILENAME,
    SSH_KEY_FILENAME,
};
pub use driver::{docker_url, Driver, MachineState, DRIVER_NAME};
pub use error::{Error, Result};
pub use launcher::{hypervisor_args, GUEST_SSH_PORT, QEMU_SYSTEM};
pub use port::allocate_ephemeral_port;
pub use process::{CommandOutput, CommandRunner, SystemRunner, STDERR_ERROR_MARKER};
pub use seed::{build_seed_archive, build_seed_disk, raw_image_path, FORMAT_MARKER, QEMU_IMG};
pub use ssh::{generate_key_pair, public_key_path};

/// Port the Docker daemon inside the guest listens on (TLS).
pub const DOCKER_PORT: u16 = 2376;

pub fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{}/.local/share/qemu-machine", home)
}
