use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vmtest_kbuild::build::kconfig::kconfig;
use vmtest_kbuild::preflight::{check_autobuild_tools, check_build_tools};
use vmtest_kbuild::{autobuild, find_kbuild_error, inspect_package, package_kernel, KBuild, Settings};

/// vmtest-kbuild - Build and package Linux kernels for vmtest
#[derive(Parser)]
#[command(name = "vmtest-kbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and package the latest release of every supported branch
    Autobuild {
        /// Kernel repository, created if missing
        #[arg(short = 'k', long = "kernel-directory", default_value = ".")]
        kernel_dir: PathBuf,

        /// Directory holding one build directory per release
        #[arg(short = 'b', long = "build-directory", default_value = ".")]
        build_dir: PathBuf,

        /// Output directory for packages
        #[arg(short = 'p', long = "package-directory", default_value = ".")]
        package_dir: PathBuf,
    },

    /// Build an already checked out kernel
    Build {
        /// Kernel source directory
        #[arg(short = 'k', long = "kernel-directory", default_value = ".")]
        kernel_dir: PathBuf,

        /// Build output directory
        #[arg(short = 'b', long = "build-directory", default_value = ".")]
        build_dir: PathBuf,

        /// Package the built kernel into this directory
        #[arg(short = 'p', long = "package")]
        package_dir: Option<PathBuf>,
    },

    /// Print the kernel configuration
    Config,

    /// Summarize a kernel package
    Inspect {
        /// Path to a kernel-*.tar.zst package
        package: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = find_kbuild_error(&err).map_or(1, |e| e.exit_code());
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config => cmd_config(),
        Commands::Inspect { package } => cmd_inspect(&package),
        Commands::Build {
            kernel_dir,
            build_dir,
            package_dir,
        } => {
            let settings = Settings::load(cli.config.as_deref())?;
            check_build_tools(&settings.toolchain, package_dir.is_some())?;
            cmd_build(&settings, &kernel_dir, &build_dir, package_dir.as_deref())
        }
        Commands::Autobuild {
            kernel_dir,
            build_dir,
            package_dir,
        } => {
            let settings = Settings::load(cli.config.as_deref())?;
            check_autobuild_tools(&settings.toolchain)?;
            let packages = autobuild(&settings, &kernel_dir, &build_dir, &package_dir)?;
            for package in packages {
                info!("wrote {}", package.display());
            }
            Ok(())
        }
    }
}

fn cmd_config() -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(kconfig().as_bytes())
        .context("writing configuration to stdout")?;
    Ok(())
}

fn cmd_build(
    settings: &Settings,
    kernel_dir: &Path,
    build_dir: &Path,
    package_dir: Option<&Path>,
) -> Result<()> {
    let mut kbuild = KBuild::new(kernel_dir, build_dir, settings);
    kbuild.build()?;
    if let Some(package_dir) = package_dir {
        let package = package_kernel(&mut kbuild, package_dir, None)?;
        info!("wrote {}", package.display());
    }
    Ok(())
}

fn cmd_inspect(package: &Path) -> Result<()> {
    let summary = inspect_package(package)?;
    println!("{}", summary);
    summary.ensure_bootable()
}
