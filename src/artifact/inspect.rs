//! Reading packages back.
//!
//! Used by the `inspect` subcommand to check a package before it is
//! published: both kernel images must sit at the archive root.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub entries: usize,
    pub modules: usize,
    pub has_vmlinux: bool,
    pub has_vmlinuz: bool,
}

impl PackageSummary {
    /// Fail unless both `vmlinux` and `vmlinuz` are present.
    pub fn ensure_bootable(&self) -> Result<()> {
        let mut missing = Vec::new();
        if !self.has_vmlinux {
            missing.push("vmlinux");
        }
        if !self.has_vmlinuz {
            missing.push("vmlinuz");
        }
        if !missing.is_empty() {
            bail!("package is missing {}", missing.join(" and "));
        }
        Ok(())
    }
}

impl fmt::Display for PackageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        writeln!(f, "entries: {}", self.entries)?;
        writeln!(f, "modules: {}", self.modules)?;
        writeln!(f, "vmlinux: {}", yes_no(self.has_vmlinux))?;
        write!(f, "vmlinuz: {}", yes_no(self.has_vmlinuz))
    }
}

/// Decompress and walk a `tar.zst` package.
pub fn inspect_package(path: &Path) -> Result<PackageSummary> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let decoder = zstd::stream::Decoder::new(f)?;
    summarize(tar::Archive::new(decoder))
        .with_context(|| format!("reading package '{}'", path.display()))
}

fn summarize<R: Read>(mut archive: tar::Archive<R>) -> Result<PackageSummary> {
    let mut summary = PackageSummary::default();
    for entry in archive.entries()? {
        let entry = entry?;
        let path: PathBuf = entry
            .path()?
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        summary.entries += 1;

        if path.extension().is_some_and(|ext| ext == "ko") {
            summary.modules += 1;
        } else if path == Path::new("vmlinux") {
            summary.has_vmlinux = true;
        } else if path == Path::new("vmlinuz") {
            summary.has_vmlinuz = true;
        }
    }
    Ok(summary)
}
