//! Preflight checks for build validation.
//!
//! Validates that the host system has the tools a kernel build and package
//! needs before anything runs. A missing `zstd` otherwise only shows up after
//! a full kernel build.
//!
//! # Example
//!
//! ```rust
//! use vmtest_kbuild::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("zstd") {
//!     println!("zstd not installed");
//! }
//!
//! let tools = &[("make", "make"), ("objcopy", "binutils")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::config::Toolchain;

/// Check if a command exists on the host system.
///
/// Accepts either a bare name looked up in PATH or a path to an executable.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// Check the programs `build` needs, plus the packaging ones if `package`.
pub fn check_build_tools(toolchain: &Toolchain, package: bool) -> Result<()> {
    let mut tools = toolchain.build_tools();
    if package {
        tools.extend(toolchain.package_tools());
    }
    check_required_tools(&tools)
}

/// Check the programs `autobuild` needs: fetching, building and packaging.
pub fn check_autobuild_tools(toolchain: &Toolchain) -> Result<()> {
    let mut tools = toolchain.fetch_tools();
    tools.extend(toolchain.build_tools());
    tools.extend(toolchain.package_tools());
    check_required_tools(&tools)
}
