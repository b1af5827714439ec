//! VM home bookkeeping.
//!
//! Every VM lives in its own directory under the VM home:
//!
//! ```text
//! ~/maxemu/
//! └── ubuntu-22.04/
//!     ├── vm.cfg       # emulator command line
//!     ├── vm.json      # what was detected and decided
//!     ├── nvram.fd     # per-VM copy of the firmware NVRAM template
//!     └── disk.qcow2   # system disk (install guests only)
//! ```

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use pkg_constants::paths::{
    NVRAM_FILENAME, SYSTEM_DISK_FILENAME, VM_CONFIG_FILENAME, VM_HOME_DIR, VM_RECORD_FILENAME,
};
use pkg_constants::vm::DUPLICATE_NAME_SUFFIX;
use pkg_types::Arch;
use pkg_types::validate::validate_vm_name;

use crate::cmdline::{CommandLine, build_command_line};
use crate::disk::create_disk;
use crate::host::Host;
use crate::plan::VmPlan;

/// Metadata persisted next to `vm.cfg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub name: String,
    #[serde(default)]
    pub os_name: String,
    #[serde(default)]
    pub os_version: String,
    pub arch: Arch,
    pub machine: String,
    #[serde(default)]
    pub iso: Option<String>,
    pub cpus: u32,
    pub memory: String,
    pub created_at: DateTime<Utc>,
}

impl VmRecord {
    pub fn from_plan(plan: &VmPlan) -> Self {
        Self {
            name: plan.name.clone(),
            os_name: plan.guest.os_name.clone(),
            os_version: plan.guest.os_version.clone(),
            arch: plan.arch,
            machine: plan.machine.clone(),
            iso: plan.iso.as_ref().map(|p| p.to_string_lossy().to_string()),
            cpus: plan.cpus,
            memory: plan.memory.clone(),
            created_at: Utc::now(),
        }
    }
}

/// A VM directory found under the VM home.
#[derive(Debug, Clone)]
pub struct VmEntry {
    pub name: String,
    pub dir: PathBuf,
    /// `None` when `vm.json` is missing or unreadable.
    pub record: Option<VmRecord>,
}

/// The directory tree holding all generated VMs.
#[derive(Debug, Clone)]
pub struct VmStore {
    home: PathBuf,
}

impl VmStore {
    pub fn new(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
        }
    }

    /// `~/maxemu`.
    pub fn default_home() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(VM_HOME_DIR))
            .ok_or_else(|| anyhow!("cannot determine the home directory"))
    }

    /// The configured VM home, or [`VmStore::default_home`].
    pub fn resolve_home(configured: Option<PathBuf>) -> Result<PathBuf> {
        match configured {
            Some(home) => Ok(home),
            None => Self::default_home(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn vm_dir(&self, name: &str) -> PathBuf {
        self.home.join(name)
    }

    fn checked_dir(&self, name: &str) -> Result<PathBuf> {
        validate_vm_name(name)?;
        Ok(self.vm_dir(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vm_dir(name).exists()
    }

    /// `base` if unused, otherwise the first free `base-node<i>`.
    pub fn allocate_name(&self, base: &str) -> String {
        if !self.exists(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|i| format!("{}{}{}", base, DUPLICATE_NAME_SUFFIX, i))
            .find(|candidate| !self.exists(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Write a VM directory for `plan`. Returns the directory.
    ///
    /// A directory created here is removed again if any step fails.
    pub async fn create(&self, host: &Host, plan: &VmPlan) -> Result<PathBuf> {
        let dir = self.checked_dir(&plan.name)?;
        let fresh = tokio::fs::metadata(&dir).await.is_err();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        if let Err(e) = self.populate(host, plan, &dir).await {
            if fresh && let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                warn!("failed to clean up {}: {}", dir.display(), cleanup);
            }
            return Err(e);
        }

        info!("VM {} written to {}", plan.name, dir.display());
        Ok(dir)
    }

    async fn populate(&self, host: &Host, plan: &VmPlan, dir: &Path) -> Result<()> {
        if let Some(firmware) = &plan.firmware {
            let nvram = dir.join(NVRAM_FILENAME);
            tokio::fs::copy(&firmware.vars_template, &nvram)
                .await
                .with_context(|| {
                    format!(
                        "copy NVRAM template {} → {}",
                        firmware.vars_template.display(),
                        nvram.display()
                    )
                })?;
            debug!("NVRAM template copied to {}", nvram.display());
        }

        if plan.iso.is_some() {
            create_disk(
                host,
                &plan.emulator,
                &dir.join(SYSTEM_DISK_FILENAME),
                &plan.disk_size,
            )
            .await?;
        }

        let cmdline = build_command_line(host, plan);
        let cfg_path = dir.join(VM_CONFIG_FILENAME);
        tokio::fs::write(&cfg_path, cmdline.render())
            .await
            .with_context(|| format!("write {}", cfg_path.display()))?;

        let record = VmRecord::from_plan(plan);
        let record_path = dir.join(VM_RECORD_FILENAME);
        tokio::fs::write(&record_path, serde_json::to_string_pretty(&record)?)
            .await
            .with_context(|| format!("write {}", record_path.display()))?;
        Ok(())
    }

    /// Load the persisted command line of `name`.
    pub async fn load(&self, name: &str) -> Result<CommandLine> {
        let dir = self.checked_dir(name)?;
        let cfg_path = dir.join(VM_CONFIG_FILENAME);
        let content = tokio::fs::read_to_string(&cfg_path)
            .await
            .with_context(|| format!("VM {} not found (no {})", name, cfg_path.display()))?;
        CommandLine::parse(&content).with_context(|| format!("invalid {}", cfg_path.display()))
    }

    /// Every VM directory that holds a `vm.cfg`, sorted by name.
    pub async fn list(&self) -> Result<Vec<VmEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.home).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.home.display()));
            }
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if tokio::fs::metadata(path.join(VM_CONFIG_FILENAME))
                .await
                .is_err()
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let record = match tokio::fs::read_to_string(path.join(VM_RECORD_FILENAME)).await {
                Ok(data) => match serde_json::from_str::<VmRecord>(&data) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!("ignoring unreadable record of {}: {}", name, e);
                        None
                    }
                },
                Err(_) => None,
            };
            entries.push(VmEntry {
                name,
                dir: path,
                record,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Delete the directory of `name` with everything in it, including
    /// leftovers of a VM that never got a `vm.cfg`.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let dir = self.checked_dir(name)?;
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            anyhow::bail!("VM {} not found in {}", name, self.home.display());
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("failed to remove {}", dir.display()))?;
        info!("VM {} deleted", name);
        Ok(())
    }
}
