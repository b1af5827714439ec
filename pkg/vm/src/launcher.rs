use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tracing::{info, warn};

use pkg_constants::paths::VM_CONFIG_FILENAME;

use crate::cmdline::CommandLine;

/// Boot the VM stored in `vm_dir` and wait for the emulator to exit.
///
/// The emulator runs with `vm_dir` as its working directory so the relative
/// `nvram.fd` and `disk.qcow2` in `vm.cfg` resolve there.
pub async fn launch(vm_dir: &Path) -> Result<()> {
    let cfg_path = vm_dir.join(VM_CONFIG_FILENAME);
    let content = tokio::fs::read_to_string(&cfg_path)
        .await
        .with_context(|| format!("failed to read {}", cfg_path.display()))?;
    let cmdline = CommandLine::parse(&content)
        .with_context(|| format!("invalid {}", cfg_path.display()))?;

    run(&cmdline, vm_dir).await
}

/// Spawn `cmdline` inside `work_dir` with inherited stdio.
pub async fn run(cmdline: &CommandLine, work_dir: &Path) -> Result<()> {
    if tokio::fs::metadata(&cmdline.emulator).await.is_err() {
        anyhow::bail!(
            "emulator {} no longer exists, recreate the VM",
            cmdline.emulator.display()
        );
    }

    let mut child = tokio::process::Command::new(&cmdline.emulator)
        .args(cmdline.to_args())
        .current_dir(work_dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to spawn {}", cmdline.emulator.display()))?;

    info!(
        "Launched {} (pid={}) in {}",
        cmdline.emulator.display(),
        child.id().unwrap_or(0),
        work_dir.display()
    );

    // The emulator shares our process group and sees Ctrl-C itself.
    let status = loop {
        tokio::select! {
            status = child.wait() => break status.context("failed to wait for the emulator")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, waiting for the emulator to exit");
            }
        }
    };

    if !status.success() {
        anyhow::bail!("emulator exited with status {:?}", status.code());
    }
    info!("Emulator exited cleanly");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    #[tokio::test]
    async fn runs_inside_the_vm_directory() {
        let tmp = scratch("maxemu-launch-cwd-test");
        std::fs::write(tmp.join("nvram.fd"), b"").unwrap();

        let mut cmd = CommandLine::new("/bin/sh");
        cmd.push("-c", "test -f nvram.fd");
        std::fs::write(tmp.join("vm.cfg"), cmd.render()).unwrap();

        launch(&tmp).await.unwrap();
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let tmp = scratch("maxemu-launch-fail-test");
        let mut cmd = CommandLine::new("/bin/sh");
        cmd.push("-c", "exit 3");
        std::fs::write(tmp.join("vm.cfg"), cmd.render()).unwrap();

        let err = launch(&tmp).await.unwrap_err();
        assert!(err.to_string().contains("Some(3)"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_config_or_emulator() {
        let tmp = scratch("maxemu-launch-missing-test");
        assert!(launch(&tmp).await.is_err());

        let cmd = CommandLine::new("/nonexistent/qemu-system-x86_64");
        std::fs::write(tmp.join("vm.cfg"), cmd.render()).unwrap();
        let err = launch(&tmp).await.unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
