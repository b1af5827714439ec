//! Everything decided about a VM before anything is written to disk.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use pkg_constants::paths::QEMU_SYSTEM_PREFIX;
use pkg_constants::vm::{
    BAREMETAL_PREFIX, DEFAULT_CPU_COUNT, DEFAULT_DISK_SIZE, DEFAULT_MEMORY,
};
use pkg_types::config::Bus;
use pkg_types::validate::validate_vm_name;
use pkg_types::{Arch, GuestInfo};

use crate::cmdline::random_mac;
use crate::firmware::{Firmware, locate_firmware, needs_firmware};
use crate::host::{Host, HostCapacity, parse_size};
use crate::store::VmStore;

/// Tunables merged from CLI arguments, the config file and defaults.
#[derive(Debug, Clone)]
pub struct VmSettings {
    pub cpus: u32,
    pub memory: String,
    pub disk_size: String,
    pub cdrom_bus: Bus,
    pub disk_bus: Bus,
    pub qemu_dir: Option<PathBuf>,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPU_COUNT,
            memory: DEFAULT_MEMORY.to_string(),
            disk_size: DEFAULT_DISK_SIZE.to_string(),
            cdrom_bus: Bus::Scsi,
            disk_bus: Bus::Virtio,
            qemu_dir: None,
        }
    }
}

/// A fully resolved VM, ready to be persisted.
#[derive(Debug, Clone)]
pub struct VmPlan {
    pub name: String,
    pub guest: GuestInfo,
    pub arch: Arch,
    pub machine: String,
    pub emulator: PathBuf,
    pub firmware: Option<Firmware>,
    pub iso: Option<PathBuf>,
    pub cpus: u32,
    pub memory: String,
    pub disk_size: String,
    pub cdrom_bus: Bus,
    pub disk_bus: Bus,
    pub mac: String,
}

/// Pick the VM name: explicit, bare-metal, or derived from the guest.
///
/// Derived names get a `-node<i>` suffix when taken; the bare-metal VM
/// of an architecture is always the same directory. An explicit name must
/// not be taken yet.
pub fn choose_name(
    host: &Host,
    store: &VmStore,
    guest: Option<&GuestInfo>,
    arch: Arch,
    explicit: Option<&str>,
) -> Result<String> {
    if let Some(name) = explicit {
        validate_vm_name(name)?;
        if store.exists(name) {
            bail!(
                "VM {} already exists in {}, remove it first or pick another name",
                name,
                store.home().display()
            );
        }
        return Ok(name.to_string());
    }
    let name = match guest {
        Some(guest) => store.allocate_name(&guest.vm_name(host.arch)),
        None => format!("{}{}", BAREMETAL_PREFIX, arch),
    };
    validate_vm_name(&name)?;
    Ok(name)
}

/// Don't hand the guest more vCPUs than the host has.
pub fn effective_cpus(requested: u32, capacity: &HostCapacity) -> u32 {
    let available = u32::try_from(capacity.cpus).unwrap_or(u32::MAX).max(1);
    if requested > available {
        warn!(
            "requested {} vCPUs but the host has {}, using {}",
            requested, available, available
        );
        available
    } else {
        requested.max(1)
    }
}

impl VmPlan {
    /// Resolve a VM installing `guest` from `iso`, or a bare-metal VM when
    /// `install` is `None`.
    pub fn resolve(
        host: &Host,
        store: &VmStore,
        install: Option<(GuestInfo, &Path)>,
        explicit_name: Option<&str>,
        settings: &VmSettings,
    ) -> Result<Self> {
        let (guest, iso) = match install {
            Some((guest, iso)) => (guest, Some(iso.to_path_buf())),
            None => (
                GuestInfo {
                    arch: Some(host.arch),
                    ..GuestInfo::default()
                },
                None,
            ),
        };
        let arch = guest.arch.unwrap_or(host.arch);
        let machine = arch.default_machine().to_string();

        let guest_ref = iso.as_ref().map(|_| &guest);
        let name = choose_name(host, store, guest_ref, arch, explicit_name)?;

        let binary = format!("{}{}", QEMU_SYSTEM_PREFIX, arch);
        let emulator = host.locate_qemu(&binary, settings.qemu_dir.as_deref())?;

        let firmware = if needs_firmware(host, arch) {
            Some(locate_firmware(host, &emulator, arch, &guest)?)
        } else {
            info!("native guest on a Windows host, booting without pflash firmware");
            None
        };

        let capacity = HostCapacity::probe();
        let cpus = effective_cpus(settings.cpus, &capacity);
        if let Some(bytes) = parse_size(&settings.memory)
            && capacity.memory_bytes > 0
            && bytes > capacity.memory_bytes
        {
            warn!(
                "requested {} of guest memory exceeds host memory ({} MiB)",
                settings.memory,
                capacity.memory_bytes >> 20
            );
        }

        Ok(Self {
            name,
            guest,
            arch,
            machine,
            emulator,
            firmware,
            iso,
            cpus,
            memory: settings.memory.clone(),
            disk_size: settings.disk_size.clone(),
            cdrom_bus: settings.cdrom_bus,
            disk_bus: settings.disk_bus,
            mac: random_mac(),
        })
    }
}
