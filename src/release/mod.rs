//! Finding the newest release of each supported kernel branch.
//!
//! Tags are listed from the remote with `git ls-remote`; nothing is cloned
//! until [`mirror::KernelMirror::fetch_tags`] is called with the result.

pub mod mirror;

use anyhow::Result;
use std::fmt;
use tracing::debug;

use crate::build::kconfig::is_supported_version;
use crate::config::Settings;
use crate::process::Cmd;
use crate::version::KernelVersion;

/// A release tag on a supported branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Supported branch the release belongs to, e.g. `5.12`.
    pub branch: String,
    /// Full version without the `v` prefix, e.g. `5.12.1` or `5.12-rc1`.
    pub version: String,
}

impl Release {
    /// Git tag name, e.g. `v5.12.1`.
    pub fn tag(&self) -> String {
        format!("v{}", self.version)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

/// Latest release of every supported branch on the configured remote.
pub fn get_latest_releases(settings: &Settings) -> Result<Vec<Release>> {
    let out = Cmd::new(&settings.toolchain.git)
        .args(["ls-remote", "--tags", "--refs"])
        .arg(&settings.git_url)
        .error_msg(format!("listing tags of {} failed", settings.git_url))
        .run()?;
    Ok(latest_releases(&out.stdout, is_supported_version))
}

/// Pick the newest tag per branch from `git ls-remote --tags` output.
///
/// Branches come out in the reverse of the order they were first seen in the
/// version-sorted tag list, which puts the newest branch first.
pub fn latest_releases(ls_remote: &str, is_supported: impl Fn(&str) -> bool) -> Vec<Release> {
    let mut candidates: Vec<Release> = ls_remote
        .lines()
        .filter_map(parse_tag_line)
        .filter(|release| is_supported(release.branch.as_str()))
        .collect();
    candidates.sort_by_cached_key(|release| KernelVersion::new(release.version.as_str()));

    let mut latest: Vec<Release> = Vec::new();
    for release in candidates {
        match latest.iter_mut().find(|r| r.branch == release.branch) {
            Some(slot) => *slot = release,
            None => latest.push(release),
        }
    }
    latest.reverse();
    debug!(?latest, "latest releases");
    latest
}

/// `<sha>\trefs/tags/v<major>.<minor><suffix>` where suffix is empty, `-rcN`
/// or `.N`. The branch is `<major>.<minor>`.
fn parse_tag_line(line: &str) -> Option<Release> {
    let mut fields = line.split_whitespace();
    let sha = fields.next()?;
    let refname = fields.next()?;
    if sha.is_empty() || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let version = refname.strip_prefix("refs/tags/v")?;

    let (major, rest) = split_number(version)?;
    let (minor, suffix) = split_number(rest.strip_prefix('.')?)?;
    is_release_suffix(suffix).then(|| Release {
        branch: format!("{}.{}", major, minor),
        version: version.to_string(),
    })
}

/// Split a leading run of ASCII digits off `s`.
fn split_number(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (end > 0).then(|| s.split_at(end))
}

fn is_release_suffix(suffix: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }
    suffix
        .strip_prefix("-rc")
        .or_else(|| suffix.strip_prefix('.'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
