//! Path handling for reproducible debug info.
//!
//! GCC records the "logical" working directory (`$PWD`) in debug info when it
//! can, so both the canonical and the logical spelling of the build directory
//! have to be remapped.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

/// The path `cd <path>; pwd -L` would print, without spawning a shell.
pub fn logical_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_lexically(path));
    }
    let cwd = logical_cwd()?;
    Ok(normalize_lexically(&cwd.join(path)))
}

/// `$PWD` if it names the current directory, else the canonical cwd.
fn logical_cwd() -> Result<PathBuf> {
    let cwd = env::current_dir().context("resolving current directory")?;
    if let Some(pwd) = env::var_os("PWD").map(PathBuf::from) {
        if pwd.is_absolute() && same_file(&pwd, Path::new(".")) {
            return Ok(pwd);
        }
    }
    Ok(cwd)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

/// Drop `.` components and fold `..` into its parent without touching the
/// filesystem, matching how a shell tracks its logical directory.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` as UTF-8, for paths that end up in make variables.
pub fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path '{}' is not valid UTF-8", path.display()))
}

/// `-fdebug-prefix-map` values for a build.
///
/// The kernel source directory is only mapped when it differs from the build
/// directory. With `KBUILD_ABS_SRCTREE=1` the source tree is always referred
/// to by an absolute path, so the canonical spelling is enough.
pub fn debug_prefix_maps(build_real: &Path, build_logical: &Path, kernel_real: &Path) -> Vec<String> {
    let mut maps = vec![format!("{}=.", build_real.display())];
    if build_logical != build_real {
        maps.push(format!("{}=.", build_logical.display()));
    }
    if kernel_real != build_real {
        maps.push(format!("{}/=./", kernel_real.display()));
    }
    maps
}

/// Join prefix maps into a single compiler flag string.
pub fn prefix_map_cflags(maps: &[String]) -> String {
    maps.iter()
        .map(|map| format!("-fdebug-prefix-map={}", map))
        .collect::<Vec<_>>()
        .join(" ")
}
