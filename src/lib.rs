//! Kernel builds for vmtest.
//!
//! Builds Linux kernels with a fixed, VM-friendly configuration and packages
//! them as `kernel-<release>.tar.zst` archives holding the installed modules
//! and both kernel images:
//!
//! - **Config generator** - The kernel configuration and supported branches
//! - **Kernel builder** - Memoized make arguments, configuration that only
//!   changes when it must, full builds
//! - **Kernel packager** - Module install, image stripping, tar+zstd pipeline
//! - **Release fetcher** - Newest tag per supported branch from a git remote
//! - **Preflight checks** - Host tool validation before builds
//!
//! # Architecture
//!
//! ```text
//! vmtest-kbuild (binary)
//!     │
//!     ├── autobuild ── release ── release::mirror (git)
//!     │       │
//!     │       ▼
//!     ├── build::kernel::KBuild (make)
//!     │       │
//!     │       ▼
//!     └── artifact::package (make, objcopy, tar | zstd)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vmtest_kbuild::{package_kernel, KBuild, Settings};
//!
//! let settings = Settings::load(None)?;
//! let mut kbuild = KBuild::new("linux", "build", &settings);
//! kbuild.build()?;
//! let package = package_kernel(&mut kbuild, "packages".as_ref(), None)?;
//! ```

pub mod artifact;
pub mod autobuild;
pub mod build;
pub mod config;
pub mod error;
pub mod preflight;
pub mod process;
pub mod release;
pub mod version;

#[cfg(test)]
mod testutil;

pub use artifact::{inspect_package, package_kernel, PackageSummary};
pub use autobuild::autobuild;
pub use build::kernel::{ConfigChange, KBuild};
pub use config::Settings;
pub use error::{find_kbuild_error, KbuildError};
pub use release::{get_latest_releases, Release};
pub use version::KernelVersion;
