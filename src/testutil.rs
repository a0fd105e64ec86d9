//! Fake toolchain scripts so builds and packaging can run without a kernel
//! tree.
//!
//! Each fake tool appends its interesting argument to `<dir>/<tool>.log`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::{Settings, Toolchain};

pub const RELEASE: &str = "5.12.0-vmtest2";
pub const IMAGE_NAME: &str = "arch/x86/boot/bzImage";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A `make` that understands the targets the builder and packager use.
///
/// `fail` makes the given target exit with the given status.
pub fn fake_make(dir: &Path, release: &str, fail: Option<(&str, i32)>) -> PathBuf {
    let log = dir.join("make.log");
    let fail_case = match fail {
        Some((target, code)) => format!("  {}) exit {} ;;\n", target, code),
        None => String::new(),
    };
    let body = format!(
        r#"out=
cfg=.config
mod_path=
target=
for arg in "$@"; do
  case "$arg" in
    O=*) out="${{arg#O=}}" ;;
    KCONFIG_CONFIG=*) cfg="${{arg#KCONFIG_CONFIG=}}" ;;
    INSTALL_MOD_PATH=*) mod_path="${{arg#INSTALL_MOD_PATH=}}" ;;
  esac
  target="$arg"
done
echo "$target" >> "{log}"
case "$target" in
{fail_case}  olddefconfig) echo "CONFIG_RESOLVED_BY_OLDDEFCONFIG=y" >> "$out/$cfg" ;;
  kernelrelease) echo "{release}" ;;
  image_name) echo "{image}" ;;
  all)
    mkdir -p "$out/arch/x86/boot"
    echo "vmlinux with relocations" > "$out/vmlinux"
    echo "bzImage" > "$out/{image}"
    ;;
  modules_install)
    dir="$mod_path/lib/modules/{release}"
    mkdir -p "$dir/kernel/drivers/block" "$dir/kernel/fs"
    echo loop > "$dir/kernel/drivers/block/loop.ko"
    echo configs > "$dir/kernel/fs/configs.ko"
    echo "kernel/drivers/block/loop.ko:" > "$dir/modules.dep"
    ln -s "$out" "$dir/build"
    ln -s "$out" "$dir/source"
    ;;
esac
"#,
        log = log.display(),
        release = release,
        image = IMAGE_NAME,
        fail_case = fail_case,
    );
    write_script(dir, "make", &body)
}

/// `objcopy --remove-relocations=* IN OUT` as a plain copy.
pub fn fake_objcopy(dir: &Path) -> PathBuf {
    write_script(dir, "objcopy", "cp \"$2\" \"$3\"\n")
}

/// A `zstd` that stores its input uncompressed at the `-o` path, or exits
/// with `fail` after draining its input.
pub fn fake_zstd(dir: &Path, fail: Option<i32>) -> PathBuf {
    let body = match fail {
        Some(code) => format!("cat > /dev/null\nexit {}\n", code),
        None => r#"out=
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
cat > "$out"
"#
        .to_string(),
    };
    write_script(dir, "zstd", &body)
}

/// A `git` that answers `ls-remote` with `tags` and logs everything else.
pub fn fake_git(dir: &Path, tags: &[&str]) -> PathBuf {
    let log = dir.join("git.log");
    let listing: String = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| format!("{:040x}\trefs/tags/{}\n", i + 1, tag))
        .collect();
    let listing_path = dir.join("ls-remote.txt");
    fs::write(&listing_path, listing).unwrap();
    let body = format!(
        r#"echo "$*" >> "{log}"
case "$1" in
  ls-remote) cat "{listing}" ;;
  init) mkdir -p "$2/.git" ;;
esac
"#,
        log = log.display(),
        listing = listing_path.display(),
    );
    write_script(dir, "git", &body)
}

/// Settings that run every tool from `dir` with a fixed job count.
pub fn settings_for(dir: &Path) -> Settings {
    let tool = |name: &str| dir.join(name).display().to_string();
    Settings {
        git_url: "https://git.example.org/linux.git".to_string(),
        jobs: Some(2),
        toolchain: Toolchain {
            make: tool("make"),
            objcopy: tool("objcopy"),
            tar: "tar".to_string(),
            zstd: tool("zstd"),
            git: tool("git"),
        },
        ..Settings::default()
    }
}

/// Lines a fake tool logged, or nothing if it never ran.
pub fn read_log(dir: &Path, tool: &str) -> Vec<String> {
    fs::read_to_string(dir.join(format!("{}.log", tool)))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
