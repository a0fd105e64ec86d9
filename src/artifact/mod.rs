//! Kernel packages.
//!
//! - [`package`] - Assemble a built kernel into a `tar.zst`
//! - [`inspect`] - Read a package back and check its contents

pub mod inspect;
pub mod package;

pub use inspect::{inspect_package, PackageSummary};
pub use package::{compress_directory, default_package_name, package_kernel};
