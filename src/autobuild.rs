//! Build and package the latest release of every supported branch.
//!
//! Releases are built one after another in the order the fetcher returns
//! them. Each gets its own build directory, `<build_dir>/build-<tag>`, so
//! rebuilding a release later reuses its objects.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::package::package_kernel;
use crate::build::kernel::KBuild;
use crate::config::Settings;
use crate::error::KbuildError;
use crate::release::mirror::KernelMirror;
use crate::release::{get_latest_releases, Release};

/// Build directory used for `release` under `build_dir`.
pub fn release_build_dir(build_dir: &Path, release: &Release) -> PathBuf {
    build_dir.join(format!("build-{}", release.tag()))
}

/// Fetch, build and package every latest release.
///
/// Returns the written packages in build order.
pub fn autobuild(
    settings: &Settings,
    kernel_dir: &Path,
    build_dir: &Path,
    package_dir: &Path,
) -> Result<Vec<PathBuf>> {
    info!("getting list of latest releases");
    let releases = get_latest_releases(settings)?;
    if releases.is_empty() {
        return Err(KbuildError::NoReleases.into());
    }
    let names: Vec<String> = releases.iter().map(Release::tag).collect();
    info!("latest releases are: {}", names.join(", "));

    let mirror = KernelMirror::new(kernel_dir, settings);
    mirror.ensure()?;
    mirror.fetch_tags(&releases)?;

    let mut packages = Vec::with_capacity(releases.len());
    for release in &releases {
        let release_build_dir = release_build_dir(build_dir, release);
        info!(
            "preparing to build {} in {}",
            release,
            release_build_dir.display()
        );
        mirror.checkout(release)?;

        let mut kbuild = KBuild::new(kernel_dir, &release_build_dir, settings);
        kbuild
            .build()
            .with_context(|| format!("building {}", release))?;
        let package = package_kernel(&mut kbuild, package_dir, None)
            .with_context(|| format!("packaging {}", release))?;
        packages.push(package);
    }
    Ok(packages)
}
