//! Emulator command line assembly and its `vm.cfg` form.
//!
//! `vm.cfg` holds the quoted emulator path on the first line, then one
//! argument group per line: a flag, optionally followed by a space and its
//! value. Values run to the end of the line, so paths may contain spaces.

use anyhow::{Result, anyhow};
use rand::Rng;
use std::path::PathBuf;

use pkg_constants::paths::{NVRAM_FILENAME, SYSTEM_DISK_FILENAME};
use pkg_constants::vm::{MAC_OCTET_MAX, MAC_OCTET_MIN, MAC_PREFIX};
use pkg_types::config::Bus;

use crate::host::{Host, HostOs};
use crate::plan::VmPlan;

/// One flag with its optional value, e.g. `-m 4G` or `-nodefaults`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub flag: String,
    pub value: Option<String>,
}

/// An emulator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub emulator: PathBuf,
    pub args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(emulator: impl Into<PathBuf>) -> Self {
        Self {
            emulator: emulator.into(),
            args: Vec::new(),
        }
    }

    pub fn flag(&mut self, flag: &str) -> &mut Self {
        self.args.push(Arg {
            flag: flag.to_string(),
            value: None,
        });
        self
    }

    pub fn push(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg {
            flag: flag.to_string(),
            value: Some(value.into()),
        });
        self
    }

    pub fn device(&mut self, opts: impl Into<String>) -> &mut Self {
        self.push("-device", opts)
    }

    pub fn drive(&mut self, opts: impl Into<String>) -> &mut Self {
        self.push("-drive", opts)
    }

    /// Values passed for `flag`, in order.
    pub fn values_of<'a>(&'a self, flag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.args
            .iter()
            .filter(move |a| a.flag == flag)
            .filter_map(|a| a.value.as_deref())
    }

    /// Arguments for process spawning (without the emulator itself).
    pub fn to_args(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() * 2);
        for arg in &self.args {
            argv.push(arg.flag.clone());
            if let Some(value) = &arg.value {
                argv.push(value.clone());
            }
        }
        argv
    }

    /// `vm.cfg` contents.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("\"{}\"", self.emulator.display())];
        for arg in &self.args {
            match &arg.value {
                Some(value) => lines.push(format!("{} {}", arg.flag, value)),
                None => lines.push(arg.flag.clone()),
            }
        }
        lines.join("\n")
    }

    /// Read back a `vm.cfg`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let emulator = lines
            .next()
            .ok_or_else(|| anyhow!("vm.cfg is empty"))?
            .trim_matches('"');
        if emulator.is_empty() {
            anyhow::bail!("vm.cfg names no emulator");
        }

        let mut cmdline = CommandLine::new(emulator);
        for line in lines {
            if !line.starts_with('-') {
                anyhow::bail!("unexpected line in vm.cfg: {}", line);
            }
            match line.split_once(' ') {
                Some((flag, value)) => cmdline.push(flag, value.trim()),
                None => cmdline.flag(line),
            };
        }
        Ok(cmdline)
    }
}

/// Locally administered MAC: `52:54:` plus four random octets in `[2, 253]`.
pub fn random_mac() -> String {
    let mut rng = rand::rng();
    let octets: Vec<String> = (0..4)
        .map(|_| format!("{:02x}", rng.random_range(MAC_OCTET_MIN..=MAC_OCTET_MAX)))
        .collect();
    format!("{}:{}", MAC_PREFIX, octets.join(":"))
}

/// QEMU option values separate keys with `,`; a literal comma is `,,`.
fn escape_opt(value: &str) -> String {
    value.replace(',', ",,")
}

/// Assemble the emulator command line for `plan` on `host`.
pub fn build_command_line(host: &Host, plan: &VmPlan) -> CommandLine {
    let mut cmd = CommandLine::new(&plan.emulator);

    cmd.flag("-nodefaults");
    cmd.push("-machine", plan.machine.as_str());

    if plan.arch == host.arch {
        match host.accel() {
            Some(accel) => {
                cmd.push("-accel", accel);
                // WHPX rejects `-cpu host`.
                if !host.is_windows() {
                    cmd.push("-cpu", "host");
                }
            }
            None => {
                cmd.push("-cpu", "max");
            }
        }
    } else {
        cmd.push("-cpu", "max");
    }

    cmd.push("-smp", plan.cpus.to_string());
    cmd.push("-m", plan.memory.as_str());

    if let Some(firmware) = &plan.firmware {
        cmd.drive(format!(
            "if=pflash,unit=0,format=raw,file={},readonly=on",
            escape_opt(&firmware.code.display().to_string())
        ));
        cmd.drive(format!(
            "if=pflash,unit=1,format=raw,file={}",
            NVRAM_FILENAME
        ));
    }

    if let Some(iso) = &plan.iso {
        if plan.cdrom_bus == Bus::Scsi || plan.disk_bus == Bus::Scsi {
            cmd.device("virtio-scsi-pci,id=scsi");
        }
        let mut scsi_id = 0;

        match plan.disk_bus {
            Bus::Scsi => {
                cmd.device(format!(
                    "scsi-hd,bus=scsi.0,channel=0,scsi-id={},drive=hd0",
                    scsi_id
                ));
                scsi_id += 1;
            }
            Bus::Virtio => {
                cmd.device("virtio-blk-pci,drive=hd0");
            }
        }

        match plan.cdrom_bus {
            Bus::Scsi => {
                cmd.device(format!(
                    "scsi-cd,bus=scsi.0,channel=0,scsi-id={},drive=cd0",
                    scsi_id
                ));
            }
            Bus::Virtio => {
                cmd.device("virtio-blk-pci,drive=cd0");
            }
        }

        cmd.drive(format!(
            "if=none,id=cd0,media=cdrom,file={}",
            escape_opt(&iso.display().to_string())
        ));
        cmd.drive(format!(
            "if=none,id=hd0,media=disk,file={}",
            SYSTEM_DISK_FILENAME
        ));
    }

    cmd.device("qemu-xhci,id=usb-bus");
    cmd.device("usb-kbd,bus=usb-bus.0");
    cmd.device("usb-tablet,bus=usb-bus.0");

    cmd.device(format!("virtio-net-pci,mac={},netdev=nic0", plan.mac));
    cmd.push("-netdev", "user,id=nic0");

    cmd.device("intel-hda");
    cmd.device("hda-duplex");

    cmd.device("virtio-gpu-pci");
    if host.os == HostOs::Darwin {
        cmd.push("-display", "cocoa,show-cursor=on");
    }

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::Firmware;
    use pkg_types::{Arch, GuestInfo};

    fn host(os: HostOs) -> Host {
        Host {
            arch: Arch::X86_64,
            os,
        }
    }

    fn plan(arch: Arch, iso: Option<&str>) -> VmPlan {
        VmPlan {
            name: "ubuntu-22.04".into(),
            guest: GuestInfo {
                os_name: "ubuntu".into(),
                os_version: "22.04".into(),
                arch: Some(arch),
            },
            arch,
            machine: arch.default_machine().into(),
            emulator: PathBuf::from("/usr/bin/qemu-system-x86_64"),
            firmware: Some(Firmware {
                code: PathBuf::from("/usr/share/qemu/edk2-x86_64-code.fd"),
                vars_template: PathBuf::from("/usr/share/qemu/edk2-i386-vars.fd"),
            }),
            iso: iso.map(PathBuf::from),
            cpus: 4,
            memory: "4G".into(),
            disk_size: "40G".into(),
            cdrom_bus: Bus::Scsi,
            disk_bus: Bus::Virtio,
            mac: "52:54:0a:0b:0c:0d".into(),
        }
    }

    #[test]
    fn full_install_command_line() {
        let cmd = build_command_line(
            &host(HostOs::Linux),
            &plan(Arch::X86_64, Some("/isos/ubuntu.iso")),
        );
        let expected = "\"/usr/bin/qemu-system-x86_64\"
-nodefaults
-machine q35
-accel kvm
-cpu host
-smp 4
-m 4G
-drive if=pflash,unit=0,format=raw,file=/usr/share/qemu/edk2-x86_64-code.fd,readonly=on
-drive if=pflash,unit=1,format=raw,file=nvram.fd
-device virtio-scsi-pci,id=scsi
-device virtio-blk-pci,drive=hd0
-device scsi-cd,bus=scsi.0,channel=0,scsi-id=0,drive=cd0
-drive if=none,id=cd0,media=cdrom,file=/isos/ubuntu.iso
-drive if=none,id=hd0,media=disk,file=disk.qcow2
-device qemu-xhci,id=usb-bus
-device usb-kbd,bus=usb-bus.0
-device usb-tablet,bus=usb-bus.0
-device virtio-net-pci,mac=52:54:0a:0b:0c:0d,netdev=nic0
-netdev user,id=nic0
-device intel-hda
-device hda-duplex
-device virtio-gpu-pci";
        assert_eq!(cmd.render(), expected);
    }

    #[test]
    fn scsi_ids_follow_disk_then_cdrom() {
        let mut p = plan(Arch::X86_64, Some("/isos/a.iso"));
        p.disk_bus = Bus::Scsi;
        let cmd = build_command_line(&host(HostOs::Linux), &p);
        let devices: Vec<&str> = cmd.values_of("-device").collect();
        assert!(devices.contains(&"scsi-hd,bus=scsi.0,channel=0,scsi-id=0,drive=hd0"));
        assert!(devices.contains(&"scsi-cd,bus=scsi.0,channel=0,scsi-id=1,drive=cd0"));
    }

    #[test]
    fn virtio_only_has_no_scsi_controller() {
        let mut p = plan(Arch::X86_64, Some("/isos/a.iso"));
        p.cdrom_bus = Bus::Virtio;
        let cmd = build_command_line(&host(HostOs::Linux), &p);
        let devices: Vec<&str> = cmd.values_of("-device").collect();
        assert!(!devices.contains(&"virtio-scsi-pci,id=scsi"));
        assert!(devices.contains(&"virtio-blk-pci,drive=cd0"));
    }

    #[test]
    fn baremetal_has_no_drives_for_media() {
        let cmd = build_command_line(&host(HostOs::Linux), &plan(Arch::X86_64, None));
        assert!(!cmd.values_of("-drive").any(|d| d.contains("cd0")));
        assert_eq!(cmd.values_of("-drive").count(), 2);
    }

    #[test]
    fn foreign_guest_is_emulated() {
        let cmd = build_command_line(&host(HostOs::Linux), &plan(Arch::Aarch64, None));
        assert_eq!(cmd.values_of("-accel").count(), 0);
        assert_eq!(cmd.values_of("-cpu").collect::<Vec<_>>(), vec!["max"]);
        assert_eq!(cmd.values_of("-machine").collect::<Vec<_>>(), vec!["virt"]);
    }

    #[test]
    fn windows_host_gets_whpx_without_cpu_host() {
        let mut p = plan(Arch::X86_64, None);
        p.firmware = None;
        let cmd = build_command_line(&host(HostOs::Windows), &p);
        assert_eq!(cmd.values_of("-accel").collect::<Vec<_>>(), vec!["whpx"]);
        assert_eq!(cmd.values_of("-cpu").count(), 0);
        assert_eq!(cmd.values_of("-drive").count(), 0);
    }

    #[test]
    fn host_without_accelerator_uses_max_cpu() {
        let cmd = build_command_line(
            &host(HostOs::Other("freebsd".into())),
            &plan(Arch::X86_64, None),
        );
        assert_eq!(cmd.values_of("-accel").count(), 0);
        assert_eq!(cmd.values_of("-cpu").collect::<Vec<_>>(), vec!["max"]);
    }

    #[test]
    fn macos_gets_cocoa_display() {
        let cmd = build_command_line(&host(HostOs::Darwin), &plan(Arch::X86_64, None));
        assert_eq!(
            cmd.values_of("-display").collect::<Vec<_>>(),
            vec!["cocoa,show-cursor=on"]
        );
        assert_eq!(cmd.values_of("-accel").collect::<Vec<_>>(), vec!["hvf"]);
    }

    #[test]
    fn parse_reverses_render_with_spaces_in_paths() {
        let mut cmd = CommandLine::new("/Applications/QEMU Tools/qemu-system-aarch64");
        cmd.flag("-nodefaults")
            .drive("if=none,id=cd0,media=cdrom,file=/Users/me/My ISOs/debian.iso");

        let parsed = CommandLine::parse(&cmd.render()).unwrap();
        assert_eq!(parsed, cmd);
        assert_eq!(
            parsed.to_args(),
            vec![
                "-nodefaults",
                "-drive",
                "if=none,id=cd0,media=cdrom,file=/Users/me/My ISOs/debian.iso"
            ]
        );
    }

    #[test]
    fn commas_in_paths_are_doubled() {
        let mut p = plan(Arch::X86_64, Some("/isos/debian 12,amd64.iso"));
        p.firmware = Some(Firmware {
            code: PathBuf::from("/fw/a,b/code.fd"),
            vars_template: PathBuf::from("/fw/vars.fd"),
        });
        let cmd = build_command_line(&host(HostOs::Linux), &p);
        let drives: Vec<&str> = cmd.values_of("-drive").collect();
        assert!(drives.contains(&"if=pflash,unit=0,format=raw,file=/fw/a,,b/code.fd,readonly=on"));
        assert!(drives.contains(&"if=none,id=cd0,media=cdrom,file=/isos/debian 12,,amd64.iso"));

        let parsed = CommandLine::parse(&cmd.render()).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CommandLine::parse("").is_err());
        assert!(CommandLine::parse("\"\"\n-m 4G").is_err());
        assert!(CommandLine::parse("\"/usr/bin/qemu\"\nnot-a-flag").is_err());
    }

    #[test]
    fn random_macs_are_well_formed() {
        for _ in 0..32 {
            let mac = random_mac();
            assert!(mac.starts_with("52:54:"));
            let octets: Vec<&str> = mac.split(':').collect();
            assert_eq!(octets.len(), 6);
            for octet in &octets[2..] {
                let v = u8::from_str_radix(octet, 16).unwrap();
                assert!((MAC_OCTET_MIN..=MAC_OCTET_MAX).contains(&v));
                assert_eq!(*octet, octet.to_lowercase());
            }
        }
    }
}
