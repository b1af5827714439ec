//! Host probing: architecture, OS, hardware accelerator and emulator lookup.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pkg_constants::paths::{
    QEMU_FALLBACK_DIRS_MACOS, QEMU_FALLBACK_DIRS_UNIX, QEMU_FALLBACK_DIRS_WINDOWS,
};
use pkg_types::Arch;

/// Operating system of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    Darwin,
    Windows,
    Other(String),
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => HostOs::Linux,
            "macos" => HostOs::Darwin,
            "windows" => HostOs::Windows,
            other => HostOs::Other(other.to_string()),
        }
    }
}

/// The machine the emulator runs on.
#[derive(Debug, Clone)]
pub struct Host {
    pub arch: Arch,
    pub os: HostOs,
}

impl Host {
    /// Detect the current host. Fails on architectures QEMU guests can't match.
    pub fn detect() -> Result<Self> {
        let host = Self {
            arch: Arch::host()?,
            os: HostOs::current(),
        };
        debug!("host: arch={} os={:?}", host.arch, host.os);
        Ok(host)
    }

    pub fn is_windows(&self) -> bool {
        self.os == HostOs::Windows
    }

    /// Hardware accelerator QEMU should use on this host, if any.
    pub fn accel(&self) -> Option<&'static str> {
        match self.os {
            HostOs::Linux => Some("kvm"),
            HostOs::Darwin => Some("hvf"),
            HostOs::Windows => Some("whpx"),
            HostOs::Other(_) => None,
        }
    }

    /// Executable suffix for binaries found outside `PATH`.
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Install directories searched when a binary is not on `PATH`.
    pub fn fallback_dirs(&self) -> &'static [&'static str] {
        match self.os {
            HostOs::Windows => QEMU_FALLBACK_DIRS_WINDOWS,
            HostOs::Darwin => QEMU_FALLBACK_DIRS_MACOS,
            _ => QEMU_FALLBACK_DIRS_UNIX,
        }
    }

    /// Find a QEMU binary.
    ///
    /// Search order:
    /// 1. `PATH`
    /// 2. `extra_dir` (the configured `qemu-dir`)
    /// 3. Per-OS fallback install directories
    pub fn locate_qemu(&self, binary: &str, extra_dir: Option<&Path>) -> Result<PathBuf> {
        if let Ok(path) = which::which(binary) {
            info!("Found {} in PATH: {}", binary, path.display());
            return Ok(path);
        }

        let file_name = format!("{}{}", binary, self.exe_suffix());
        let candidates = extra_dir
            .map(Path::to_path_buf)
            .into_iter()
            .chain(self.fallback_dirs().iter().map(PathBuf::from));

        for dir in candidates {
            let path = dir.join(&file_name);
            debug!("looking for {} at {}", binary, path.display());
            if path.is_file() {
                info!("Found {} at {}", binary, path.display());
                return Ok(path);
            }
        }

        Err(anyhow!("{} not found, please install it first", binary))
    }
}

/// CPU and memory the host can offer to a guest.
#[derive(Debug, Clone, Copy)]
pub struct HostCapacity {
    pub cpus: usize,
    pub memory_bytes: u64,
}

impl HostCapacity {
    pub fn probe() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        let cpus = match sys.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        Self {
            cpus,
            memory_bytes: sys.total_memory(),
        }
    }
}

/// Parse a QEMU size (`4G`, `512M`, `2048`) into bytes.
///
/// A bare number is taken as MiB for memory, matching QEMU's `-m` default unit.
pub fn parse_size(size: &str) -> Option<u64> {
    let size = size.trim();
    let (digits, unit) = match size.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => size.split_at(idx),
        None => (size, "M"),
    };
    let value: u64 = digits.parse().ok()?;
    let shift = match unit.to_ascii_uppercase().as_str() {
        "K" | "KB" | "KIB" => 10,
        "M" | "MB" | "MIB" => 20,
        "G" | "GB" | "GIB" => 30,
        "T" | "TB" | "TIB" => 40,
        _ => return None,
    };
    value.checked_mul(1u64 << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(os: HostOs) -> Host {
        Host {
            arch: Arch::X86_64,
            os,
        }
    }

    #[test]
    fn accelerators_per_os() {
        assert_eq!(host(HostOs::Linux).accel(), Some("kvm"));
        assert_eq!(host(HostOs::Darwin).accel(), Some("hvf"));
        assert_eq!(host(HostOs::Windows).accel(), Some("whpx"));
        assert_eq!(host(HostOs::Other("freebsd".into())).accel(), None);
    }

    #[test]
    fn fallback_dirs_per_os() {
        assert_eq!(
            host(HostOs::Windows).fallback_dirs(),
            &["C:/Program Files/qemu"]
        );
        assert!(host(HostOs::Darwin).fallback_dirs().contains(&"/opt/homebrew/bin"));
        assert_eq!(host(HostOs::Linux).fallback_dirs(), &["/usr/local/bin"]);
    }

    #[test]
    fn locate_qemu_in_extra_dir() {
        let tmp = std::env::temp_dir().join("maxemu-locate-qemu-test");
        std::fs::create_dir_all(&tmp).unwrap();
        let h = Host::detect().unwrap();
        let name = "qemu-system-maxemu-test-arch";
        let bin = tmp.join(format!("{}{}", name, h.exe_suffix()));
        std::fs::write(&bin, b"").unwrap();

        let found = h.locate_qemu(name, Some(&tmp)).unwrap();
        assert_eq!(found, bin);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn locate_qemu_missing() {
        let h = Host::detect().unwrap();
        let err = h
            .locate_qemu("qemu-system-does-not-exist", None)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("4G"), Some(4 << 30));
        assert_eq!(parse_size("512M"), Some(512 << 20));
        assert_eq!(parse_size("2048"), Some(2048 << 20));
        assert_eq!(parse_size("1T"), Some(1 << 40));
        assert_eq!(parse_size("lots"), None);
        assert_eq!(parse_size("4X"), None);
    }

    #[test]
    fn capacity_reports_cpus() {
        let cap = HostCapacity::probe();
        assert!(cap.cpus >= 1);
    }
}
