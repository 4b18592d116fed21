use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use qemu_machine::MachineConfig;

pub(crate) const CONFIG_FILE: &str = "config.json";

/// Store directory for `name`: `<storage>/machines/<name>`, where storage
/// defaults to the per-user data directory.
pub(crate) fn machine_dir(storage_flag: Option<&str>, name: &str) -> PathBuf {
    let root = match storage_flag {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(qemu_machine::default_data_dir()),
    };
    root.join("machines").join(name)
}

pub(crate) fn load_machine_config(store: &Path) -> Result<MachineConfig> {
    let path = store.join(CONFIG_FILE);

    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let cfg: MachineConfig = serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!(
                "Machine not found at {}. Run `qemu-machine create` first.",
                store.display()
            );
        }
        Err(e) => bail!("Failed to read {}: {}", path.display(), e),
    }
}

pub(crate) fn save_machine_config(config: &MachineConfig) -> Result<()> {
    let path = config.store_path.join(CONFIG_FILE);
    let contents = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))
}
