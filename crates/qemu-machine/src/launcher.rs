use tracing::info;

use crate::config::{CacheMode, MachineConfig};
use crate::error::Result;
use crate::port::allocate_ephemeral_port;
use crate::process::CommandRunner;

pub const QEMU_SYSTEM: &str = "qemu-system-x86_64";
pub const GUEST_SSH_PORT: u16 = 22;

const NETDEV_ID: &str = "network0";

/// Assemble the qemu command line for `config`, forwarding `host_ssh_port`
/// on the host loopback to the guest's SSH port.
///
/// qemu is told to daemonize, so it exits once the VM is initialised and
/// leaves its pid in the machine's store.
pub fn hypervisor_args(config: &MachineConfig, host_ssh_port: u16) -> Vec<String> {
    let mut drive = format!(
        "file={},format=qcow2",
        escape_option_value(&config.disk_path.display().to_string())
    );
    if config.cache_mode != CacheMode::Default {
        drive.push_str(&format!(",cache={}", config.cache_mode));
    }
    drive.push_str(&format!(",aio={}", config.io_mode));

    vec![
        "-netdev".to_string(),
        format!(
            "user,id={},hostfwd=tcp::{}-:{}",
            NETDEV_ID, host_ssh_port, GUEST_SSH_PORT
        ),
        "-device".to_string(),
        format!("e1000,netdev={}", NETDEV_ID),
        "-m".to_string(),
        config.memory_mb.to_string(),
        "-smp".to_string(),
        config.cpu_count.to_string(),
        "-boot".to_string(),
        "d".to_string(),
        "-cdrom".to_string(),
        config.boot_image_path.display().to_string(),
        "-display".to_string(),
        "none".to_string(),
        "-daemonize".to_string(),
        "-pidfile".to_string(),
        config.pid_file_path().display().to_string(),
        "-drive".to_string(),
        drive,
    ]
}

/// qemu splits `-drive` on commas; a literal comma is written twice.
fn escape_option_value(value: &str) -> String {
    value.replace(',', ",,")
}

/// Pick a host SSH port and boot the machine. Returns the chosen port.
///
/// Returns once qemu has daemonized or failed during startup; nothing waits
/// for the guest to boot or for SSH to answer.
pub fn start(runner: &dyn CommandRunner, config: &MachineConfig) -> Result<u16> {
    let ssh_port = allocate_ephemeral_port()?;
    let args = hypervisor_args(config, ssh_port);

    info!(machine = %config.machine_name, ssh_port, "launching {}", QEMU_SYSTEM);
    runner.run(QEMU_SYSTEM, &args)?.check(QEMU_SYSTEM, &args)?;

    info!(
        "Waiting for VM to start (ssh -p {} {}@localhost)...",
        ssh_port, config.ssh_user
    );
    Ok(ssh_port)
}
