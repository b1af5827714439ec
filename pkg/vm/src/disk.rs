use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;

use pkg_constants::paths::QEMU_IMG;

use crate::host::Host;

/// `qemu-img` shipped in the same directory as `emulator`.
pub fn qemu_img_for(host: &Host, emulator: &Path) -> Result<PathBuf> {
    let dir = emulator
        .parent()
        .ok_or_else(|| anyhow!("emulator path {} has no parent", emulator.display()))?;
    Ok(dir.join(format!("{}{}", QEMU_IMG, host.exe_suffix())))
}

/// Create a qcow2 system disk of `size` at `path`. An existing disk is kept.
pub async fn create_disk(host: &Host, emulator: &Path, path: &Path, size: &str) -> Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        info!("Keeping existing disk {}", path.display());
        return Ok(());
    }

    let qemu_img = qemu_img_for(host, emulator)?;
    info!("Creating {} qcow2 disk at {}", size, path.display());

    let output = tokio::process::Command::new(&qemu_img)
        .args(["create", "-f", "qcow2"])
        .arg(path)
        .arg(size)
        .output()
        .await
        .with_context(|| format!("failed to run {}", qemu_img.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} create failed ({:?}): {}",
            QEMU_IMG,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
