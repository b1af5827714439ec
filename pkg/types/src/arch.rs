use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Guest/host CPU architecture, named the way QEMU names its system emulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm,
    Aarch64,
    I386,
    X86_64,
    Riscv32,
    Riscv64,
}

/// Token prefixes that identify each architecture in image names and labels.
///
/// Matching is a prefix match on the lowercased token, so `amd64` also
/// accepts `amd64dvd` and `x64` accepts `x64fre`.
const ARCH_PATTERNS: &[(&str, Arch)] = &[
    ("arm64", Arch::Aarch64),
    ("ar64", Arch::Aarch64),
    ("aarch64", Arch::Aarch64),
    ("x86_64", Arch::X86_64),
    ("x86-64", Arch::X86_64),
    ("x8664", Arch::X86_64),
    ("x864", Arch::X86_64),
    ("amd64", Arch::X86_64),
    ("x64", Arch::X86_64),
    ("i386", Arch::I386),
    ("i486", Arch::I386),
    ("i586", Arch::I386),
    ("i686", Arch::I386),
    ("riscv64", Arch::Riscv64),
    ("risc64", Arch::Riscv64),
    ("risv64", Arch::Riscv64),
    ("ris64", Arch::Riscv64),
    ("riscv32", Arch::Riscv32),
    ("risc32", Arch::Riscv32),
    ("risv32", Arch::Riscv32),
    ("ris32", Arch::Riscv32),
    ("armv7", Arch::Arm),
    ("armhf", Arch::Arm),
];

impl Arch {
    /// Match a single token against the architecture patterns.
    pub fn from_tag(tag: &str) -> Option<Arch> {
        let tag = tag.to_ascii_lowercase();
        ARCH_PATTERNS
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix))
            .map(|(_, arch)| *arch)
    }

    /// Architecture of the machine we are running on.
    pub fn host() -> Result<Arch> {
        let machine = std::env::consts::ARCH;
        // `std` names 32-bit hosts differently from install media.
        match machine {
            "arm" => Ok(Arch::Arm),
            "x86" => Ok(Arch::I386),
            other => Arch::from_tag(other)
                .ok_or_else(|| anyhow!("host arch '{}' is not supported yet", other)),
        }
    }

    /// QEMU's name for this architecture (`qemu-system-<name>`, `edk2-<name>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::I386 => "i386",
            Arch::X86_64 => "x86_64",
            Arch::Riscv32 => "riscv32",
            Arch::Riscv64 => "riscv64",
        }
    }

    /// Machine model QEMU should emulate for this architecture.
    pub fn default_machine(&self) -> &'static str {
        match self {
            Arch::X86_64 | Arch::I386 => "q35",
            _ => "virt",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_common_spellings() {
        assert_eq!(Arch::from_tag("amd64"), Some(Arch::X86_64));
        assert_eq!(Arch::from_tag("x86_64"), Some(Arch::X86_64));
        assert_eq!(Arch::from_tag("X64FRE"), Some(Arch::X86_64));
        assert_eq!(Arch::from_tag("arm64"), Some(Arch::Aarch64));
        assert_eq!(Arch::from_tag("aarch64"), Some(Arch::Aarch64));
        assert_eq!(Arch::from_tag("i686"), Some(Arch::I386));
        assert_eq!(Arch::from_tag("riscv64"), Some(Arch::Riscv64));
        assert_eq!(Arch::from_tag("riscv32"), Some(Arch::Riscv32));
        assert_eq!(Arch::from_tag("armhf"), Some(Arch::Arm));
    }

    #[test]
    fn rejects_non_arch_tokens() {
        assert_eq!(Arch::from_tag("desktop"), None);
        assert_eq!(Arch::from_tag("22.04"), None);
        assert_eq!(Arch::from_tag("arm"), None);
        assert_eq!(Arch::from_tag(""), None);
    }

    #[test]
    fn default_machine_models() {
        assert_eq!(Arch::X86_64.default_machine(), "q35");
        assert_eq!(Arch::I386.default_machine(), "q35");
        assert_eq!(Arch::Aarch64.default_machine(), "virt");
        assert_eq!(Arch::Riscv64.default_machine(), "virt");
    }

    #[test]
    fn host_arch_is_known_on_ci_targets() {
        if cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
            assert!(Arch::host().is_ok());
        }
    }

    #[test]
    fn serde_uses_qemu_names() {
        let json = serde_json::to_string(&Arch::X86_64).unwrap();
        assert_eq!(json, "\"x86_64\"");
        let back: Arch = serde_json::from_str("\"aarch64\"").unwrap();
        assert_eq!(back, Arch::Aarch64);
    }
}
