//! Kernel packaging.
//!
//! A package is a `tar.zst` of the module directory a kernel installs into
//! (`lib/modules/<release>`), with `vmlinux` and `vmlinuz` added next to the
//! modules:
//!
//! ```text
//! kernel-5.12.0-vmtest2.tar.zst
//! ├── kernel/...        modules
//! ├── modules.*         depmod output
//! ├── vmlinux           unstripped kernel, relocations removed
//! └── vmlinuz           bootable image
//! ```

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, info, warn};

use crate::build::kernel::KBuild;
use crate::config::Toolchain;
use crate::process::{display_command, status_to_result, Cmd};

/// `kernel-<release>.tar.zst`
pub fn default_package_name(release: &str) -> String {
    format!("kernel-{}.tar.zst", release)
}

/// Install, assemble and compress a built kernel into `output_dir`.
///
/// Returns the path of the written package. The staging directory lives
/// inside the build directory and is removed however this returns.
pub fn package_kernel(
    kbuild: &mut KBuild,
    output_dir: &Path,
    package_name: Option<&str>,
) -> Result<PathBuf> {
    let span = kbuild.span().clone();
    let _enter = span.enter();

    kbuild.make_args()?;
    let release = kbuild.kernel_release()?;
    let package_name = package_name
        .map(str::to_string)
        .unwrap_or_else(|| default_package_name(&release));
    let tarball = output_dir.join(package_name);

    info!("packaging kernel {} to {}", release, tarball.display());

    let image_name = kbuild.image_name()?;
    let build_dir = kbuild.build_dir().to_path_buf();

    let staging = tempfile::Builder::new()
        .prefix("install.")
        .tempdir_in(&build_dir)
        .with_context(|| format!("creating staging directory in '{}'", build_dir.display()))?;
    let staging_root = staging
        .path()
        .canonicalize()
        .context("resolving staging directory")?;
    let modules_dir = staging_root.join("lib/modules").join(&release);

    info!("installing modules");
    kbuild
        .make()?
        .arg(format!("INSTALL_MOD_PATH={}", staging_root.display()))
        .arg("modules_install")
        .error_msg("make modules_install failed")
        .run_interactive()?;

    if !modules_dir.is_dir() {
        anyhow::bail!(
            "modules_install did not create '{}'; kernel release mismatch?",
            modules_dir.display()
        );
    }

    // These point back into the build and source trees.
    remove_if_exists(&modules_dir.join("build"))?;
    remove_if_exists(&modules_dir.join("source"))?;

    info!("installed {} kernel modules", count_modules(&modules_dir));

    info!("copying vmlinux");
    let vmlinux = modules_dir.join("vmlinux");
    Cmd::new(&kbuild.settings().toolchain.objcopy)
        .arg("--remove-relocations=*")
        .arg_path(&build_dir.join("vmlinux"))
        .arg_path(&vmlinux)
        .error_msg("objcopy of vmlinux failed")
        .run()?;
    set_mode(&vmlinux, 0o644)?;

    info!("copying vmlinuz");
    let image = build_dir.join(&image_name);
    let vmlinuz = modules_dir.join("vmlinuz");
    fs::copy(&image, &vmlinuz).with_context(|| {
        format!("copying '{}' -> '{}'", image.display(), vmlinuz.display())
    })?;
    set_mode(&vmlinuz, 0o644)?;

    info!("creating tarball");
    let settings = kbuild.settings();
    compress_directory(&settings.toolchain, &modules_dir, &tarball, settings.zstd_level)?;

    info!("packaged kernel {} to {}", release, tarball.display());
    Ok(tarball)
}

/// Stream `dir` through `tar | zstd` into `tarball`.
///
/// If either side fails, the partial tarball is removed and the failure is
/// reported: tar's if it failed on its own, zstd's otherwise. A tar killed by
/// SIGPIPE only failed because zstd went away first.
pub fn compress_directory(
    toolchain: &Toolchain,
    dir: &Path,
    tarball: &Path,
    zstd_level: u32,
) -> Result<()> {
    if let Some(parent) = tarball.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }

    let tar_args: Vec<OsString> =
        vec!["-C".into(), dir.into(), "-c".into(), ".".into()];
    let tar_display = display_command(OsStr::new(&toolchain.tar), &tar_args);
    let zstd_args: Vec<OsString> = vec![
        "-T0".into(),
        format!("-{}", zstd_level).into(),
        "-q".into(),
        "-".into(),
        "-o".into(),
        tarball.into(),
        "-f".into(),
    ];
    let zstd_display = display_command(OsStr::new(&toolchain.zstd), &zstd_args);

    debug!(command = %tar_display, "running");
    let mut tar = Command::new(&toolchain.tar)
        .args(&tar_args)
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", tar_display))?;
    let tar_stdout = tar.stdout.take().context("tar stdout was not captured")?;

    debug!(command = %zstd_display, "running");
    let zstd = Command::new(&toolchain.zstd)
        .args(&zstd_args)
        .stdin(Stdio::from(tar_stdout))
        .spawn();
    let mut zstd = match zstd {
        Ok(child) => child,
        Err(e) => {
            let _ = tar.kill();
            let _ = tar.wait();
            remove_partial(tarball);
            return Err(e).with_context(|| format!("failed to spawn `{}`", zstd_display));
        }
    };

    let tar_status = tar.wait().context("waiting for tar")?;
    let zstd_status = zstd.wait().context("waiting for zstd")?;

    let err = match (
        status_to_result(&tar_display, tar_status),
        status_to_result(&zstd_display, zstd_status),
    ) {
        (Ok(()), Ok(())) => return Ok(()),
        (Err(_), Err(zstd_err)) if killed_by_sigpipe(tar_status) => zstd_err,
        (Err(err), _) | (Ok(()), Err(err)) => err,
    };
    remove_partial(tarball);
    Err(anyhow::Error::new(err)
        .context(format!("creating tarball '{}'", tarball.display())))
}

fn killed_by_sigpipe(status: ExitStatus) -> bool {
    status.signal() == Some(libc::SIGPIPE)
}

fn remove_partial(tarball: &Path) {
    if let Err(e) = fs::remove_file(tarball) {
        if e.kind() != ErrorKind::NotFound {
            warn!("could not remove partial tarball {}: {}", tarball.display(), e);
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing '{}'", path.display())),
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on '{}'", path.display()))
}

fn count_modules(modules_dir: &Path) -> usize {
    let mut count = 0;
    for entry in walkdir::WalkDir::new(modules_dir) {
        match entry {
            Ok(e) => {
                if e.path().extension().is_some_and(|ext| ext == "ko") {
                    count += 1;
                }
            }
            Err(e) => warn!("error reading module entry: {}", e),
        }
    }
    count
}
