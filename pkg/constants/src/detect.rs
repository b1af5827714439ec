//! Image detection constants.

/// Image name prefixes whose volume label is misleading and never consulted.
pub const LABEL_SKIP_PREFIXES: &[&str] = &["kali", "freebsd"];

/// Labels this short carry no useful information.
pub const MIN_LABEL_LEN: usize = 6;

/// Extension expected on install images.
pub const ISO_EXTENSION: &str = "iso";

/// Volume label probe binary.
pub const BLKID: &str = "blkid";
