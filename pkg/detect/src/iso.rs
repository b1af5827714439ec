use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pkg_constants::detect::{ISO_EXTENSION, LABEL_SKIP_PREFIXES, MIN_LABEL_LEN};
use pkg_types::GuestInfo;

use crate::image::parse_image_name;
use crate::label::LabelProbe;

/// File name of an install image without its `.iso` extension.
pub fn image_name(iso: &Path) -> Result<String> {
    let file_name = iso
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", iso.display()))?
        .to_string_lossy()
        .to_string();

    let suffix = format!(".{}", ISO_EXTENSION);
    if file_name.len() > suffix.len() {
        let cut = file_name.len() - suffix.len();
        if let (Some(stem), Some(ext)) = (file_name.get(..cut), file_name.get(cut..))
            && ext.eq_ignore_ascii_case(&suffix)
        {
            return Ok(stem.to_string());
        }
    }

    Ok(iso
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(file_name))
}

/// Prefix match on the name as given, so `Kali-...` still reads its label.
fn skips_label(image_name: &str) -> bool {
    LABEL_SKIP_PREFIXES
        .iter()
        .any(|prefix| image_name.starts_with(prefix))
}

/// Guess the guest behind an install image from its file name and volume label.
///
/// Facts found in the label override those from the file name. The result
/// may be incomplete; callers decide whether that is acceptable.
pub async fn parse_iso(iso: &Path, probe: &dyn LabelProbe) -> Result<GuestInfo> {
    let name = image_name(iso)?;
    let mut info = parse_image_name(&name);
    debug!("file name {} → {:?}", name, info);

    if skips_label(&name) {
        debug!("not consulting the volume label of {}", name);
        return Ok(info);
    }

    if let Some(label) = probe.label(iso).await?
        && label.chars().count() >= MIN_LABEL_LEN
    {
        let from_label = parse_image_name(&label);
        debug!("label {} → {:?}", label, from_label);
        info.merge_from(from_label);
    }

    Ok(info)
}

/// Expand the given paths into install images: files are taken as-is,
/// directories contribute their `*.iso` entries sorted by name.
pub fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case(ISO_EXTENSION))
                })
                .collect();
            found.sort();
            info!("found {} image(s) in {}", found.len(), path.display());
            images.extend(found);
        } else if path.exists() {
            images.push(path.clone());
        } else {
            anyhow::bail!("{} does not exist", path.display());
        }
    }
    Ok(images)
}
