//! Filesystem path constants.

// ─── VM home ──────────────────────────────────────────────────────────────

/// Directory under the user's home that holds one sub-directory per VM.
pub const VM_HOME_DIR: &str = "maxemu";

/// Emulator command line persisted inside each VM directory.
pub const VM_CONFIG_FILENAME: &str = "vm.cfg";

/// Metadata record persisted next to `vm.cfg`.
pub const VM_RECORD_FILENAME: &str = "vm.json";

/// Per-VM copy of the firmware NVRAM template.
pub const NVRAM_FILENAME: &str = "nvram.fd";

/// System disk created for guests installed from an image.
pub const SYSTEM_DISK_FILENAME: &str = "disk.qcow2";

// ─── User config ──────────────────────────────────────────────────────────

/// Config file location relative to the platform config directory.
/// Full path = `dirs::config_dir() + USER_CONFIG_FILE`.
pub const USER_CONFIG_FILE: &str = "maxemu/config.yaml";

// ─── Emulator lookup ──────────────────────────────────────────────────────

/// Fallback QEMU install directories on Windows hosts.
pub const QEMU_FALLBACK_DIRS_WINDOWS: &[&str] = &["C:/Program Files/qemu"];

/// Fallback QEMU install directories on macOS hosts (Homebrew on Apple Silicon first).
pub const QEMU_FALLBACK_DIRS_MACOS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];

/// Fallback QEMU install directories on every other host.
pub const QEMU_FALLBACK_DIRS_UNIX: &[&str] = &["/usr/local/bin"];

/// Prefix of every system emulator binary (`qemu-system-<arch>`).
pub const QEMU_SYSTEM_PREFIX: &str = "qemu-system-";

/// Disk image utility shipped next to the system emulators.
pub const QEMU_IMG: &str = "qemu-img";

/// Firmware descriptor directory relative to the QEMU prefix on Unix hosts.
pub const FIRMWARE_DESCRIPTOR_DIR: &str = "share/qemu/firmware";

/// Firmware descriptor directory relative to the QEMU install dir on Windows.
pub const FIRMWARE_DESCRIPTOR_DIR_WINDOWS: &str = "share/firmware";
