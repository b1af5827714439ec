use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Bus a block device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Scsi,
    Virtio,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Scsi => write!(f, "scsi"),
            Bus::Virtio => write!(f, "virtio"),
        }
    }
}

/// User configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// vm-home: /data/vms
/// cpus: 8
/// memory: 8G
/// disk-size: 64G
/// cdrom-bus: scsi
/// disk-bus: virtio
/// qemu-dir: /opt/qemu/bin
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, alias = "vm-home")]
    pub vm_home: Option<String>,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default, alias = "disk-size")]
    pub disk_size: Option<String>,
    #[serde(default, alias = "cdrom-bus")]
    pub cdrom_bus: Option<Bus>,
    #[serde(default, alias = "disk-bus")]
    pub disk_bus: Option<Bus>,
    #[serde(default, alias = "qemu-dir")]
    pub qemu_dir: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    // An empty file is a valid "no overrides" config.
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let config: T = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(config)
}
