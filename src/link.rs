//! Turn an object file into a host executable with the system linker.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};

pub fn link_exe(obj: &Path, out_exe: &Path) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        // gcc drives the link (crt files, libc paths); fall back to a bare
        // linker when it is missing
        if which::which("gcc").is_ok() {
            return run("gcc", &[path_str(obj)?, "-o", path_str(out_exe)?, "-lc"]);
        }
        let linker = which::which("ld.lld")
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "ld".into());
        return run(&linker, &[path_str(obj)?, "-o", path_str(out_exe)?, "-lc"]);
    }

    #[cfg(target_os = "macos")]
    {
        let sdk = capture("xcrun", &["--sdk", "macosx", "--show-sdk-path"])?;
        let product = capture("sw_vers", &["-productVersion"])?;
        let mut parts = product.split('.');
        let platform_version = format!(
            "{}.{}",
            parts.next().unwrap_or("13"),
            parts.next().unwrap_or("0")
        );
        let arch = if cfg!(target_arch = "aarch64") {
            "arm64"
        } else {
            "x86_64"
        };

        return run(
            "ld",
            &[
                "-o",
                path_str(out_exe)?,
                "-arch",
                arch,
                "-platform_version",
                "macos",
                &platform_version,
                &platform_version,
                "-syslibroot",
                &sdk,
                "-e",
                "_main",
                path_str(obj)?,
                "-lSystem",
            ],
        );
    }

    #[cfg(target_os = "windows")]
    {
        let out_flag = format!("/OUT:{}", path_str(out_exe)?);
        return run(
            "link.exe",
            &[
                path_str(obj)?,
                &out_flag,
                "msvcrt.lib",
                "legacy_stdio_definitions.lib",
            ],
        );
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = (obj, out_exe);
        bail!("linking is not supported on this platform");
    }
}

fn run(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        bail!("{program} failed with {status}");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn capture(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        bail!("{program} failed with {}", output.status);
    }
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("non-UTF-8 path: {}", path.display()))
}
