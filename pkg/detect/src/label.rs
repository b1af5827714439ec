use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use pkg_constants::detect::BLKID;

/// Source of ISO volume labels.
#[async_trait]
pub trait LabelProbe: Send + Sync {
    /// Read the volume label of `iso`. `None` when there is none to read.
    async fn label(&self, iso: &Path) -> Result<Option<String>>;
}

/// Reads labels with `blkid -s LABEL -o value`.
pub struct BlkidProbe;

#[async_trait]
impl LabelProbe for BlkidProbe {
    async fn label(&self, iso: &Path) -> Result<Option<String>> {
        let blkid = match which::which(BLKID) {
            Ok(path) => path,
            Err(_) => {
                warn!("{} not found in PATH, skipping volume label", BLKID);
                return Ok(None);
            }
        };

        let output = tokio::process::Command::new(&blkid)
            .args(["-s", "LABEL", "-o", "value"])
            .arg(iso)
            .output()
            .await
            .with_context(|| format!("failed to run {}", blkid.display()))?;

        // blkid exits with 2 when it finds no label; that's not an error for us.
        if !output.status.success() {
            debug!(
                "{} exited with {:?} for {}",
                BLKID,
                output.status.code(),
                iso.display()
            );
            return Ok(None);
        }

        let label = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if label.is_empty() {
            Ok(None)
        } else {
            debug!("volume label of {}: {}", iso.display(), label);
            Ok(Some(label))
        }
    }
}

/// Never reports a label.
pub struct NoLabel;

#[async_trait]
impl LabelProbe for NoLabel {
    async fn label(&self, _iso: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_label_probe() {
        let label = NoLabel.label(Path::new("/tmp/any.iso")).await.unwrap();
        assert!(label.is_none());
    }

    #[tokio::test]
    async fn blkid_on_plain_file_has_no_label() {
        let tmp = std::env::temp_dir().join("maxemu-blkid-plain-test");
        std::fs::create_dir_all(&tmp).unwrap();
        let iso = tmp.join("empty.iso");
        std::fs::write(&iso, b"not an iso").unwrap();

        // Works with or without blkid installed.
        let label = BlkidProbe.label(&iso).await.unwrap();
        assert!(label.is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
