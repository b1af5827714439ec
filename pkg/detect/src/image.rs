//! Guess guest OS, version and architecture from an image name or volume label.

use pkg_types::guest::WINDOWS;
use pkg_types::{Arch, GuestInfo};

/// Ubuntu release codenames and the version each one stands for.
const UBUNTU_CODENAMES: &[(&str, &str)] = &[
    ("trusty", "14.04"),
    ("xenial", "16.04"),
    ("bionic", "18.04"),
    ("focal", "20.04"),
    ("jammy", "22.04"),
    ("kinetic", "22.10"),
    ("lunar", "23.04"),
    ("mantic", "23.10"),
    ("noble", "24.04"),
    ("oracular", "24.10"),
    ("plucky", "25.04"),
];

const UBUNTU: &str = "ubuntu";

/// Split `name` with whichever separator yields the most tokens.
///
/// Candidates are tried in the order `_`, `-`, whitespace; an earlier
/// candidate wins ties. Character splits keep empty tokens, the whitespace
/// split drops them.
pub fn tokenize(name: &str) -> Vec<&str> {
    let candidates: [Vec<&str>; 3] = [
        name.split('_').collect(),
        name.split('-').collect(),
        name.split_whitespace().collect(),
    ];

    let mut best: Vec<&str> = Vec::new();
    for tokens in candidates {
        if tokens.len() > best.len() {
            best = tokens;
        }
    }
    best
}

/// Leading run of digits and dots, when the token is a version number.
///
/// Accepts `22.04` and `10.0_rc1` (run followed by `_`), rejects `22h2`.
fn version_of(tag: &str) -> Option<&str> {
    let end = tag
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tag.len());
    if end == 0 {
        return None;
    }
    match tag[end..].chars().next() {
        None | Some('_') => Some(&tag[..end]),
        Some(_) => None,
    }
}

/// `win10` → `Some("10")`.
fn windows_release(tag: &str) -> Option<&str> {
    let digits = tag.strip_prefix("win")?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

fn ubuntu_codename(tag: &str) -> Option<&'static str> {
    UBUNTU_CODENAMES
        .iter()
        .find(|(codename, _)| *codename == tag)
        .map(|(_, version)| *version)
}

/// Parse an image file name (without extension) or a volume label.
pub fn parse_image_name(image_name: &str) -> GuestInfo {
    let lowered = image_name.to_lowercase();
    let tags = tokenize(&lowered);
    let mut info = GuestInfo::default();

    if let Some(first) = tags.first()
        && first.starts_with(|c: char| c.is_ascii_alphabetic())
    {
        info.os_name = first.to_string();
    }

    for tag in &tags {
        if let Some(release) = windows_release(tag) {
            info.os_name = WINDOWS.to_string();
            info.os_version = release.to_string();
        } else if *tag == "windows" {
            info.os_name = WINDOWS.to_string();
        } else if let Some(version) = version_of(tag) {
            if info.os_version.is_empty() {
                info.os_version = version.to_string();
            }
        } else if let Some(version) = ubuntu_codename(tag) {
            info.os_name = UBUNTU.to_string();
            info.os_version = version.to_string();
        } else if let Some(arch) = Arch::from_tag(tag) {
            info.arch = Some(arch);
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(name: &str) -> (String, String, Option<Arch>) {
        let info = parse_image_name(name);
        (info.os_name, info.os_version, info.arch)
    }

    #[test]
    fn tokenize_prefers_the_richest_split() {
        assert_eq!(
            tokenize("ubuntu-22.04.3-desktop-amd64"),
            vec!["ubuntu", "22.04.3", "desktop", "amd64"]
        );
        assert_eq!(
            tokenize("win10_22h2_english_x64"),
            vec!["win10", "22h2", "english", "x64"]
        );
        assert_eq!(tokenize("ubuntu 22.04 lts"), vec!["ubuntu", "22.04", "lts"]);
    }

    #[test]
    fn tokenize_ties_go_to_underscore() {
        assert_eq!(tokenize("a_b-c"), vec!["a", "b-c"]);
    }

    #[test]
    fn tokenize_keeps_empty_tokens_for_char_splits() {
        assert_eq!(tokenize("a__b"), vec!["a", "", "b"]);
        assert_eq!(tokenize(""), vec![""]);
    }

    #[test]
    fn ubuntu_desktop() {
        assert_eq!(
            parsed("ubuntu-22.04.3-desktop-amd64"),
            ("ubuntu".into(), "22.04.3".into(), Some(Arch::X86_64))
        );
    }

    #[test]
    fn ubuntu_codename_label() {
        assert_eq!(
            parsed("jammy-live-server-arm64"),
            ("ubuntu".into(), "22.04".into(), Some(Arch::Aarch64))
        );
    }

    #[test]
    fn debian_netinst() {
        assert_eq!(
            parsed("debian-12.1.0-arm64-netinst"),
            ("debian".into(), "12.1.0".into(), Some(Arch::Aarch64))
        );
    }

    #[test]
    fn fedora_keeps_first_version_token() {
        assert_eq!(
            parsed("Fedora-Workstation-Live-x86_64-38-1.6"),
            ("fedora".into(), "38".into(), Some(Arch::X86_64))
        );
    }

    #[test]
    fn windows_release_token() {
        assert_eq!(
            parsed("Win11_23H2_English_x64v2"),
            (WINDOWS.into(), "11".into(), Some(Arch::X86_64))
        );
    }

    #[test]
    fn windows_word_without_release() {
        let (os, ver, _) = parsed("windows-server-x64");
        assert_eq!(os, WINDOWS);
        assert_eq!(ver, "");
    }

    #[test]
    fn version_followed_by_underscore() {
        assert_eq!(version_of("10.0_rc1"), Some("10.0"));
        assert_eq!(version_of("22.04"), Some("22.04"));
        assert_eq!(version_of("22h2"), None);
        assert_eq!(version_of("lts"), None);
    }

    #[test]
    fn numeric_first_token_is_not_an_os_name() {
        let (os, ver, arch) = parsed("2023-release-amd64");
        assert_eq!(os, "");
        assert_eq!(ver, "2023");
        assert_eq!(arch, Some(Arch::X86_64));
    }

    #[test]
    fn last_arch_token_wins() {
        let (_, _, arch) = parsed("multi-1.0-i686-amd64");
        assert_eq!(arch, Some(Arch::X86_64));
    }

    #[test]
    fn nothing_recognisable() {
        assert_eq!(parsed(""), ("".into(), "".into(), None));
    }
}
