//! UEFI firmware lookup through QEMU's firmware descriptor files.
//!
//! QEMU installs JSON descriptors next to its EDK2 builds:
//!
//! ```text
//! <prefix>/share/qemu/firmware/
//! ├── 60-edk2-x86_64.json
//! ├── 50-edk2-x86_64-secure.json
//! └── 60-edk2-aarch64.json
//! ```
//!
//! Each descriptor names the read-only code image and the NVRAM template
//! that every VM gets its own copy of.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pkg_constants::paths::{FIRMWARE_DESCRIPTOR_DIR, FIRMWARE_DESCRIPTOR_DIR_WINDOWS};
use pkg_constants::vm::SECURE_BOOT_MIN_WINDOWS;
use pkg_types::{Arch, GuestInfo};

use crate::host::Host;

/// Firmware images for one guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// Read-only EDK2 code image (pflash unit 0).
    pub code: PathBuf,
    /// NVRAM template copied into the VM directory (pflash unit 1).
    pub vars_template: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    mapping: Mapping,
}

#[derive(Debug, Deserialize)]
struct Mapping {
    executable: FlashFile,
    #[serde(rename = "nvram-template")]
    nvram_template: FlashFile,
}

#[derive(Debug, Deserialize)]
struct FlashFile {
    filename: String,
}

/// Whether the guest boots from UEFI pflash at all.
///
/// Native guests on Windows hosts skip it: WHPX chokes on pflash.
pub fn needs_firmware(host: &Host, guest_arch: Arch) -> bool {
    !host.is_windows() || host.arch != guest_arch
}

/// Windows 10 and newer get the Secure Boot build.
pub fn wants_secure_boot(guest: &GuestInfo) -> bool {
    guest
        .windows_major()
        .is_some_and(|major| major >= SECURE_BOOT_MIN_WINDOWS)
}

/// Directory holding the firmware descriptors for the QEMU at `emulator`.
pub fn descriptor_dir(host: &Host, emulator: &Path) -> Result<PathBuf> {
    let qemu_dir = emulator
        .parent()
        .ok_or_else(|| anyhow!("emulator path {} has no parent", emulator.display()))?;
    if host.is_windows() {
        return Ok(qemu_dir.join(FIRMWARE_DESCRIPTOR_DIR_WINDOWS));
    }
    let prefix = qemu_dir
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", qemu_dir.display()))?;
    Ok(prefix.join(FIRMWARE_DESCRIPTOR_DIR))
}

/// `60-edk2-x86_64.json` style names: priority digits, `-edk2-<arch>`, suffix.
fn matches_descriptor(file_name: &str, arch: Arch, secure: bool) -> bool {
    let Some((priority, rest)) = file_name.split_once('-') else {
        return false;
    };
    if priority.is_empty() || !priority.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let suffix = if secure { "-secure.json" } else { ".json" };
    rest == format!("edk2-{}{}", arch.as_str(), suffix)
}

/// Locate the firmware for `guest_arch`, reading descriptors shipped with `emulator`.
pub fn locate_firmware(
    host: &Host,
    emulator: &Path,
    guest_arch: Arch,
    guest: &GuestInfo,
) -> Result<Firmware> {
    let dir = descriptor_dir(host, emulator)?;
    let secure = wants_secure_boot(guest);

    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to read firmware directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();

    let descriptor = names
        .iter()
        .find(|name| matches_descriptor(name, guest_arch, secure))
        .map(|name| dir.join(name))
        .ok_or_else(|| {
            anyhow!(
                "firmware not found for {}{} in {}",
                guest_arch,
                if secure { " (secure boot)" } else { "" },
                dir.display()
            )
        })?;
    debug!("using firmware descriptor {}", descriptor.display());

    let data = std::fs::read_to_string(&descriptor)
        .with_context(|| format!("failed to read {}", descriptor.display()))?;
    let parsed: Descriptor = serde_json::from_str(&data)
        .with_context(|| format!("invalid firmware descriptor {}", descriptor.display()))?;

    let mut firmware = Firmware {
        code: PathBuf::from(parsed.mapping.executable.filename),
        vars_template: PathBuf::from(parsed.mapping.nvram_template.filename),
    };

    // Windows builds ship descriptors with paths relative to the install prefix.
    if host.is_windows()
        && let Some(prefix) = emulator.parent().and_then(Path::parent)
    {
        firmware.code = rebase(prefix, &firmware.code);
        firmware.vars_template = rebase(prefix, &firmware.vars_template);
    }

    info!(
        "firmware: code={} vars={}",
        firmware.code.display(),
        firmware.vars_template.display()
    );
    Ok(firmware)
}

fn rebase(prefix: &Path, path: &Path) -> PathBuf {
    let relative = path.to_string_lossy();
    prefix.join(relative.trim_start_matches(['/', '\\']))
}
