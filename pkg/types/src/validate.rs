use anyhow::{Result, bail};
use pkg_constants::vm::MAX_NAME_LEN;

/// Validate a VM name before it is used as a directory under the VM home.
/// Rules: `[A-Za-z0-9._-]`, max 63 chars, no leading hyphen or dot.
pub fn validate_vm_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        bail!(
            "name '{}' exceeds {} characters (got {})",
            name,
            MAX_NAME_LEN,
            name.len()
        );
    }
    if name.starts_with('-') || name.starts_with('.') {
        bail!("name '{}' must not start with a hyphen or a dot", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        bail!(
            "name '{}' must contain only letters, digits, dots, underscores and hyphens",
            name
        );
    }
    Ok(())
}
