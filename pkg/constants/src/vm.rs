//! Virtual machine / guest constants.

/// Default vCPU count handed to `-smp`.
pub const DEFAULT_CPU_COUNT: u32 = 4;

/// Default memory size handed to `-m`.
pub const DEFAULT_MEMORY: &str = "4G";

/// Default size of the qcow2 system disk.
pub const DEFAULT_DISK_SIZE: &str = "40G";

/// Locally administered prefix for generated guest MAC addresses.
pub const MAC_PREFIX: &str = "52:54";

/// Inclusive range the four random MAC octets are drawn from.
pub const MAC_OCTET_MIN: u8 = 2;
pub const MAC_OCTET_MAX: u8 = 253;

/// Suffix appended (with a counter) when a VM name is already taken.
pub const DUPLICATE_NAME_SUFFIX: &str = "-node";

/// Name prefix for guests created without install media.
pub const BAREMETAL_PREFIX: &str = "baremetal-";

/// Maximum length of a VM name.
pub const MAX_NAME_LEN: usize = 63;

/// Windows releases from this major version on boot with Secure Boot firmware.
pub const SECURE_BOOT_MIN_WINDOWS: u32 = 10;
