//! Kernel configuration and build.
//!
//! A [`KBuild`] owns one (source tree, build directory) pair. The make
//! arguments and the kernel release string are derived lazily and memoized
//! for the lifetime of the value; build a new `KBuild` for a new tree.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vmtest_kbuild::build::kernel::KBuild;
//! use vmtest_kbuild::config::Settings;
//!
//! let mut kbuild = KBuild::new("linux", "build/linux", &Settings::default());
//! kbuild.build()?;
//! println!("built {}", kbuild.kernel_release()?);
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, Span};

use super::kconfig::kconfig;
use super::paths::{debug_prefix_maps, logical_path, path_str, prefix_map_cflags};
use crate::config::Settings;
use crate::error::KbuildError;
use crate::process::Cmd;

const CONFIG: &str = ".config";
const NEW_CONFIG: &str = ".config.new";

/// What `configure()` did to the build directory's `.config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// The resolved configuration matched the existing one and was discarded.
    Unchanged,
    /// The existing configuration was replaced.
    Changed,
    /// There was no previous configuration.
    Created,
}

pub struct KBuild {
    kernel_dir: PathBuf,
    build_dir: PathBuf,
    settings: Settings,
    span: Span,
    cached_make_args: Option<Vec<String>>,
    cached_kernel_release: Option<String>,
}

impl KBuild {
    pub fn new(kernel_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        let kernel_dir = kernel_dir.into();
        let build_dir = build_dir.into();
        let span = info_span!("kbuild", build_dir = %build_dir.display());
        Self {
            kernel_dir,
            build_dir,
            settings: settings.clone(),
            span,
            cached_make_args: None,
            cached_kernel_release: None,
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Logging context for this build.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Arguments passed to every `make` invocation.
    ///
    /// The first call creates the build directory and resolves its paths;
    /// later calls return the same arguments even if the directory moves.
    pub fn make_args(&mut self) -> Result<&[String]> {
        let args = match self.cached_make_args.take() {
            Some(args) => args,
            None => self.prepare_make()?,
        };
        Ok(self.cached_make_args.insert(args).as_slice())
    }

    fn prepare_make(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.build_dir).with_context(|| {
            format!("creating build directory '{}'", self.build_dir.display())
        })?;

        let build_real = self.build_dir.canonicalize().with_context(|| {
            format!("resolving build directory '{}'", self.build_dir.display())
        })?;
        let build_logical = logical_path(&self.build_dir)?;
        let kernel_real = self.kernel_dir.canonicalize().with_context(|| {
            format!("resolving kernel directory '{}'", self.kernel_dir.display())
        })?;

        // Every path lands in a make variable or compiler flag.
        let kernel_dir = path_str(&self.kernel_dir)?;
        let build_real_str = path_str(&build_real)?;
        path_str(&build_logical)?;
        path_str(&kernel_real)?;

        let maps = debug_prefix_maps(&build_real, &build_logical, &kernel_real);
        let cflags = prefix_map_cflags(&maps);

        Ok(vec![
            "-C".to_string(),
            kernel_dir.to_string(),
            format!("O={}", build_real_str),
            "KBUILD_ABS_SRCTREE=1".to_string(),
            format!("KBUILD_BUILD_USER={}", self.settings.build_user),
            format!("KBUILD_BUILD_HOST={}", self.settings.build_host),
            format!("KAFLAGS={}", cflags),
            format!("KCFLAGS={}", cflags),
            "-j".to_string(),
            self.settings.jobs().to_string(),
            "-s".to_string(),
        ])
    }

    /// `make` with the prepared arguments, ready for a target.
    pub(crate) fn make(&mut self) -> Result<Cmd> {
        let make = self.settings.toolchain.make.clone();
        let args = self.make_args()?;
        Ok(Cmd::new(make).args(args))
    }

    /// The release string the kernel build system reports.
    ///
    /// Fails with [`KbuildError::NotPrepared`] until [`make_args`] has run.
    ///
    /// [`make_args`]: KBuild::make_args
    pub fn kernel_release(&mut self) -> Result<String> {
        let release = match self.cached_kernel_release.take() {
            Some(release) => release,
            None => {
                let Some(args) = &self.cached_make_args else {
                    return Err(KbuildError::NotPrepared.into());
                };
                Cmd::new(&self.settings.toolchain.make)
                    .args(args)
                    .args(["-s", "kernelrelease"])
                    .error_msg("make kernelrelease failed")
                    .run()?
                    .stdout_trimmed()
                    .to_string()
            }
        };
        Ok(self.cached_kernel_release.insert(release).clone())
    }

    /// Path of the bootable image relative to the build directory
    /// (e.g. `arch/x86/boot/bzImage`).
    pub fn image_name(&mut self) -> Result<String> {
        let out = self
            .make()?
            .args(["-s", "image_name"])
            .error_msg("make image_name failed")
            .run()?;
        Ok(out.stdout_trimmed().to_string())
    }

    /// Write the vmtest configuration and resolve it with `olddefconfig`.
    ///
    /// The existing `.config` is only replaced when the resolved result
    /// differs, so an unchanged configuration does not trigger a rebuild.
    pub fn configure(&mut self) -> Result<ConfigChange> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.make_args()?;
        let config = self.build_dir.join(CONFIG);
        let new_config = self.build_dir.join(NEW_CONFIG);

        info!("configuring kernel");
        fs::write(&new_config, kconfig())
            .with_context(|| format!("writing '{}'", new_config.display()))?;
        self.make()?
            .arg(format!("KCONFIG_CONFIG={}", NEW_CONFIG))
            .arg("olddefconfig")
            .error_msg("make olddefconfig failed")
            .run_interactive()?;

        let change = match fs::read(&config) {
            Ok(old) => {
                let new = fs::read(&new_config)
                    .with_context(|| format!("reading '{}'", new_config.display()))?;
                if old == new {
                    ConfigChange::Unchanged
                } else {
                    info!("kernel configuration changed");
                    ConfigChange::Changed
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no previous kernel configuration");
                ConfigChange::Created
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading '{}'", config.display()));
            }
        };

        if change == ConfigChange::Unchanged {
            info!("kernel configuration did not change");
            fs::remove_file(&new_config)
                .with_context(|| format!("removing '{}'", new_config.display()))?;
        } else {
            fs::rename(&new_config, &config).with_context(|| {
                format!("renaming '{}' -> '{}'", new_config.display(), config.display())
            })?;
        }
        Ok(change)
    }

    /// Configure, then build every default target.
    pub fn build(&mut self) -> Result<ConfigChange> {
        let change = self.configure()?;

        let span = self.span.clone();
        let _enter = span.enter();
        let release = self.kernel_release()?;
        info!("building kernel {}", release);
        self.make()?
            .arg("all")
            .error_msg("kernel build failed")
            .run_interactive()?;
        info!("built kernel {}", release);
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_kbuild_error;
    use crate::testutil::{fake_make, read_log, settings_for, RELEASE};
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        tools: PathBuf,
        kernel: PathBuf,
        build: PathBuf,
    }

    fn fixture(fail: Option<(&str, i32)>) -> Fixture {
        let temp = TempDir::new().unwrap();
        let tools = temp.path().join("tools");
        let kernel = temp.path().join("linux");
        fs::create_dir_all(&tools).unwrap();
        fs::create_dir_all(&kernel).unwrap();
        fake_make(&tools, RELEASE, fail);
        let build = temp.path().join("build");
        Fixture {
            temp,
            tools,
            kernel,
            build,
        }
    }

    impl Fixture {
        fn kbuild(&self) -> KBuild {
            KBuild::new(&self.kernel, &self.build, &settings_for(&self.tools))
        }
    }

    #[test]
    fn test_make_args_layout() {
        let fx = fixture(None);
        let mut kbuild = fx.kbuild();
        let args = kbuild.make_args().unwrap().to_vec();

        assert!(fx.build.is_dir());
        let build_real = fx.build.canonicalize().unwrap();
        let kernel_real = fx.kernel.canonicalize().unwrap();
        assert_eq!(args[0], "-C");
        assert_eq!(args[1], fx.kernel.display().to_string());
        assert_eq!(args[2], format!("O={}", build_real.display()));
        assert!(args.contains(&"KBUILD_ABS_SRCTREE=1".to_string()));
        assert!(args.contains(&"KBUILD_BUILD_USER=vmtest".to_string()));

        let kcflags = args.iter().find(|a| a.starts_with("KCFLAGS=")).unwrap();
        assert!(kcflags.contains(&format!("-fdebug-prefix-map={}=.", build_real.display())));
        assert!(kcflags.contains(&format!("-fdebug-prefix-map={}/=./", kernel_real.display())));
        let kaflags = args.iter().find(|a| a.starts_with("KAFLAGS=")).unwrap();
        assert_eq!(&kaflags["KAFLAGS=".len()..], &kcflags["KCFLAGS=".len()..]);

        assert_eq!(&args[args.len() - 3..], ["-j", "2", "-s"]);
    }

    #[test]
    fn test_make_args_cached_after_build_dir_moves() {
        let fx = fixture(None);
        let first = fx.temp.path().join("first");
        let second = fx.temp.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        let link = fx.temp.path().join("build-link");
        std::os::unix::fs::symlink(&first, &link).unwrap();

        let mut kbuild = KBuild::new(&fx.kernel, &link, &settings_for(&fx.tools));
        let before = kbuild.make_args().unwrap().to_vec();
        assert!(before.contains(&format!("O={}", first.canonicalize().unwrap().display())));

        fs::remove_file(&link).unwrap();
        std::os::unix::fs::symlink(&second, &link).unwrap();

        let after = kbuild.make_args().unwrap().to_vec();
        assert_eq!(before, after);
    }

    #[test]
    fn test_make_args_reject_non_utf8_kernel_dir() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = fixture(None);
        let kernel = fx.temp.path().join(OsStr::from_bytes(b"linux-\xff"));
        fs::create_dir_all(&kernel).unwrap();

        let mut kbuild = KBuild::new(&kernel, &fx.build, &settings_for(&fx.tools));
        let err = kbuild.make_args().unwrap_err();
        assert!(format!("{:#}", err).contains("not valid UTF-8"));
    }

    #[test]
    fn test_kernel_release_requires_prepare() {
        let fx = fixture(None);
        let mut kbuild = fx.kbuild();
        let err = kbuild.kernel_release().unwrap_err();
        assert!(matches!(
            find_kbuild_error(&err),
            Some(KbuildError::NotPrepared)
        ));
        assert!(read_log(&fx.tools, "make").is_empty());
    }

    #[test]
    fn test_kernel_release_is_queried_once() {
        let fx = fixture(None);
        let mut kbuild = fx.kbuild();
        kbuild.make_args().unwrap();

        assert_eq!(kbuild.kernel_release().unwrap(), RELEASE);
        assert_eq!(kbuild.kernel_release().unwrap(), RELEASE);
        let queries = read_log(&fx.tools, "make")
            .into_iter()
            .filter(|l| l == "kernelrelease")
            .count();
        assert_eq!(queries, 1);
    }

    #[test]
    fn test_image_name() {
        let fx = fixture(None);
        let mut kbuild = fx.kbuild();
        assert_eq!(kbuild.image_name().unwrap(), crate::testutil::IMAGE_NAME);
    }

    #[test]
    fn test_build_twice_keeps_unchanged_config() {
        let fx = fixture(None);

        let mut kbuild = fx.kbuild();
        assert_eq!(kbuild.build().unwrap(), ConfigChange::Created);
        let config = fx.build.join(CONFIG);
        let contents = fs::read_to_string(&config).unwrap();
        assert!(contents.starts_with(kconfig()));
        assert!(contents.contains("CONFIG_RESOLVED_BY_OLDDEFCONFIG=y"));
        let ino = fs::metadata(&config).unwrap().ino();

        let mut kbuild = fx.kbuild();
        assert_eq!(kbuild.build().unwrap(), ConfigChange::Unchanged);
        assert!(!fx.build.join(NEW_CONFIG).exists());
        assert_eq!(fs::metadata(&config).unwrap().ino(), ino);
        assert_eq!(fs::read_to_string(&config).unwrap(), contents);

        let log = read_log(&fx.tools, "make");
        assert_eq!(log.iter().filter(|l| *l == "olddefconfig").count(), 2);
        assert_eq!(log.iter().filter(|l| *l == "all").count(), 2);
    }

    #[test]
    fn test_build_replaces_changed_config() {
        let fx = fixture(None);
        fs::create_dir_all(&fx.build).unwrap();
        fs::write(fx.build.join(CONFIG), "CONFIG_STALE=y\n").unwrap();

        let mut kbuild = fx.kbuild();
        assert_eq!(kbuild.build().unwrap(), ConfigChange::Changed);
        let contents = fs::read_to_string(fx.build.join(CONFIG)).unwrap();
        assert!(!contents.contains("CONFIG_STALE"));
        assert!(!fx.build.join(NEW_CONFIG).exists());
    }

    #[test]
    fn test_build_failure_propagates_exit_code() {
        let fx = fixture(Some(("all", 2)));
        let mut kbuild = fx.kbuild();
        let err = kbuild.build().unwrap_err();
        match find_kbuild_error(&err) {
            Some(KbuildError::CommandFailed { code, command }) => {
                assert_eq!(*code, 2);
                assert!(command.ends_with(" all"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_configure_failure_leaves_config_alone() {
        let fx = fixture(Some(("olddefconfig", 1)));
        fs::create_dir_all(&fx.build).unwrap();
        fs::write(fx.build.join(CONFIG), "CONFIG_OLD=y\n").unwrap();

        let mut kbuild = fx.kbuild();
        assert!(kbuild.configure().is_err());
        assert_eq!(
            fs::read_to_string(fx.build.join(CONFIG)).unwrap(),
            "CONFIG_OLD=y\n"
        );
    }
}
