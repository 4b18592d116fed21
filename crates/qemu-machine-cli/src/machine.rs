use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;

use qemu_machine::{Driver, MachineState};

use crate::cli::CreateArgs;
use crate::config::{load_machine_config, save_machine_config, CONFIG_FILE};

/// Configure a new machine from flags, build its disk and persist its config.
pub(crate) fn create(store: &Path, name: &str, flags: &CreateArgs) -> Result<()> {
    if store.join(CONFIG_FILE).exists() {
        bail!("Machine '{}' already exists at {}", name, store.display());
    }

    let mut driver = Driver::new(name, store);
    driver.set_config_from_flags(&flags.to_options())?;
    driver.pre_create_check()?;

    let config = driver.config();
    eprintln!(
        "qemu-machine: creating '{}' ({}cpus, {}MB RAM, {}MB disk)...",
        name, config.cpu_count, config.memory_mb, config.disk_size_mb
    );
    driver
        .create()
        .with_context(|| format!("failed to create machine '{}'", name))?;

    save_machine_config(driver.config())?;
    eprintln!("qemu-machine: machine '{}' created", name);
    Ok(())
}

/// Boot the machine and persist the forwarded SSH port.
pub(crate) fn start(store: &Path) -> Result<()> {
    let mut driver = Driver::from_config(load_machine_config(store)?);
    eprintln!("qemu-machine: starting '{}'...", driver.get_machine_name());
    driver
        .start()
        .with_context(|| format!("failed to start machine '{}'", driver.get_machine_name()))?;
    save_machine_config(driver.config())?;
    eprintln!(
        "qemu-machine: started, SSH forwarded from 127.0.0.1:{}",
        driver.get_ssh_port()
    );
    Ok(())
}

/// Run one of the lifecycle operations the driver refuses.
pub(crate) fn unsupported(
    store: &Path,
    op: impl FnOnce(&Driver) -> qemu_machine::Result<()>,
) -> Result<()> {
    let driver = Driver::from_config(load_machine_config(store)?);
    op(&driver)?;
    Ok(())
}

pub(crate) fn remove(store: &Path) -> Result<()> {
    let driver = Driver::from_config(load_machine_config(store)?);
    if driver.get_state()? == MachineState::Running {
        bail!(
            "Machine '{}' is still running; shut it down from inside the guest first",
            driver.get_machine_name()
        );
    }
    driver.remove()?;
    std::fs::remove_dir_all(store)
        .with_context(|| format!("failed to remove {}", store.display()))?;
    debug!(path = %store.display(), "removed store directory");
    eprintln!("qemu-machine: machine '{}' removed", driver.get_machine_name());
    Ok(())
}

pub(crate) fn ip(store: &Path) -> Result<()> {
    let driver = Driver::from_config(load_machine_config(store)?);
    match driver.get_ip()? {
        Some(ip) => println!("{}", ip),
        None => eprintln!("qemu-machine: no IP address known for '{}'", driver.get_machine_name()),
    }
    Ok(())
}

pub(crate) fn url(store: &Path) -> Result<()> {
    let driver = Driver::from_config(load_machine_config(store)?);
    match driver.get_url()? {
        Some(url) => println!("{}", url),
        None => eprintln!("qemu-machine: no URL known for '{}'", driver.get_machine_name()),
    }
    Ok(())
}

pub(crate) fn status(store: &Path) -> Result<()> {
    let driver = Driver::from_config(load_machine_config(store)?);
    println!("{}", driver.get_state()?);
    Ok(())
}

pub(crate) fn inspect(store: &Path) -> Result<()> {
    let config = load_machine_config(store)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
