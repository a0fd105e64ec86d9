//! Runtime settings.
//!
//! Every field has a default, so running without a settings file is the
//! normal case. A TOML file can override any subset:
//!
//! ```toml
//! git_url = "https://example.org/linux.git"
//! jobs = 8
//! zstd_level = 3
//!
//! [toolchain]
//! make = "gmake"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const STABLE_LINUX_GIT_URL: &str =
    "https://git.kernel.org/pub/scm/linux/kernel/git/stable/linux.git";

/// Programs invoked by the builder, packager and release fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toolchain {
    pub make: String,
    pub objcopy: String,
    pub tar: String,
    pub zstd: String,
    pub git: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
            objcopy: "objcopy".to_string(),
            tar: "tar".to_string(),
            zstd: "zstd".to_string(),
            git: "git".to_string(),
        }
    }
}

/// Preflight tool sets, as (program, package providing it) pairs.
impl Toolchain {
    /// Programs `KBuild` runs to configure and build a kernel.
    pub fn build_tools(&self) -> Vec<(&str, &str)> {
        vec![(self.make.as_str(), "make")]
    }

    /// Programs packaging runs in addition to the build tools.
    pub fn package_tools(&self) -> Vec<(&str, &str)> {
        vec![
            (self.objcopy.as_str(), "binutils"),
            (self.tar.as_str(), "tar"),
            (self.zstd.as_str(), "zstd"),
        ]
    }

    /// Programs used to list and fetch releases.
    pub fn fetch_tools(&self) -> Vec<(&str, &str)> {
        vec![(self.git.as_str(), "git")]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Remote repository that release tags are listed and fetched from.
    pub git_url: String,
    /// `KBUILD_BUILD_USER` baked into the kernel.
    pub build_user: String,
    /// `KBUILD_BUILD_HOST` baked into the kernel.
    pub build_host: String,
    /// Parallel make jobs; the CPU count when unset.
    pub jobs: Option<usize>,
    /// zstd compression level for packages.
    pub zstd_level: u32,
    pub toolchain: Toolchain,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            git_url: STABLE_LINUX_GIT_URL.to_string(),
            build_user: "vmtest".to_string(),
            build_host: "vmtest".to_string(),
            jobs: None,
            zstd_level: 19,
            toolchain: Toolchain::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or return the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings file '{}'", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("parsing settings file '{}'", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)?;
        if settings.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }
        if !(1..=22).contains(&settings.zstd_level) {
            anyhow::bail!(
                "zstd_level must be between 1 and 22, got {}",
                settings.zstd_level
            );
        }
        Ok(settings)
    }

    /// Number of parallel make jobs.
    pub fn jobs(&self) -> usize {
        if let Some(jobs) = self.jobs {
            return jobs;
        }
        match std::thread::available_parallelism() {
            Ok(n) => n.get(),
            Err(e) => {
                warn!("could not detect CPU count ({}), using 4 jobs", e);
                4
            }
        }
    }
}
