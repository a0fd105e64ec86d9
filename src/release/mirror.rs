//! Local kernel repository that release tags are fetched into.

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use super::Release;
use crate::config::Settings;
use crate::process::Cmd;

pub struct KernelMirror {
    dir: PathBuf,
    git: String,
    url: String,
}

impl KernelMirror {
    pub fn new(dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            dir: dir.into(),
            git: settings.toolchain.git.clone(),
            url: settings.git_url.clone(),
        }
    }

    /// Create the repository if the directory does not exist yet.
    ///
    /// Returns whether a repository was created.
    pub fn ensure(&self) -> Result<bool> {
        if self.dir.exists() {
            return Ok(false);
        }
        info!("creating repository in {}", self.dir.display());
        Cmd::new(&self.git)
            .arg("init")
            .arg_path(&self.dir)
            .error_msg("git init failed")
            .run_interactive()?;
        Ok(true)
    }

    /// Shallow-fetch exactly the given release tags.
    pub fn fetch_tags(&self, releases: &[Release]) -> Result<()> {
        info!("fetching releases");
        Cmd::new(&self.git)
            .arg("-C")
            .arg_path(&self.dir)
            .args(["fetch", "--depth", "1"])
            .arg(&self.url)
            .args(releases.iter().map(|release| {
                let tag = release.tag();
                format!("refs/tags/{tag}:refs/tags/{tag}")
            }))
            .error_msg("git fetch failed")
            .run_interactive()?;
        Ok(())
    }

    /// Replace the working tree with `release`.
    pub fn checkout(&self, release: &Release) -> Result<()> {
        Cmd::new(&self.git)
            .arg("-C")
            .arg_path(&self.dir)
            .arg("checkout")
            .arg(release.tag())
            .error_msg(format!("git checkout {} failed", release))
            .run_interactive()?;
        Ok(())
    }
}
