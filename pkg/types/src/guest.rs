use serde::{Deserialize, Serialize};

use crate::arch::Arch;

/// OS name reported for every Windows flavour.
pub const WINDOWS: &str = "Windows";

/// What the image heuristics could tell about a guest.
///
/// Every field is best-effort; an empty string (or `None`) means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub os_name: String,
    pub os_version: String,
    pub arch: Option<Arch>,
}

impl GuestInfo {
    /// All three facts are known.
    pub fn is_complete(&self) -> bool {
        !self.os_name.is_empty() && !self.os_version.is_empty() && self.arch.is_some()
    }

    /// Override fields with every fact `other` knows.
    pub fn merge_from(&mut self, other: GuestInfo) {
        if !other.os_name.is_empty() {
            self.os_name = other.os_name;
        }
        if !other.os_version.is_empty() {
            self.os_version = other.os_version;
        }
        if other.arch.is_some() {
            self.arch = other.arch;
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os_name == WINDOWS
    }

    /// Major release of a Windows guest, e.g. `10` for `win10`.
    pub fn windows_major(&self) -> Option<u32> {
        if !self.is_windows() {
            return None;
        }
        self.os_version.parse().ok()
    }

    /// Base VM name: `<os>-<version>`, plus `-<arch>` for foreign guests.
    pub fn vm_name(&self, host_arch: Arch) -> String {
        let mut name = format!("{}-{}", self.os_name, self.os_version);
        if let Some(arch) = self.arch
            && arch != host_arch
        {
            name.push('-');
            name.push_str(arch.as_str());
        }
        name
    }
}
