//! Kernel configuration and building.
//!
//! This module provides:
//! - [`kconfig`] - The fixed vmtest kernel configuration
//! - [`kernel`] - Configuring and building one source tree
//! - [`paths`] - Path handling for reproducible debug info

pub mod kconfig;
pub mod kernel;
pub mod paths;
