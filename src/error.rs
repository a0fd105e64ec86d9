//! Error conditions the command-line driver needs to tell apart.
//!
//! Everything else flows through `anyhow` with context attached at the call
//! site. These variants are the ones that decide the process exit status.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbuildError {
    /// An external tool ran and exited non-zero.
    #[error("command `{command}` failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    /// An external tool was terminated by a signal.
    #[error("command `{command}` was terminated by a signal")]
    CommandSignaled { command: String },

    /// `kernel_release()` was queried before the make arguments existed.
    #[error("kernel build is not prepared for make")]
    NotPrepared,

    #[error("no releases found")]
    NoReleases,
}

impl KbuildError {
    /// Exit status the binary should terminate with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            KbuildError::CommandFailed { code, .. } => u8::try_from(*code)
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(1),
            KbuildError::CommandSignaled { .. }
            | KbuildError::NotPrepared
            | KbuildError::NoReleases => 1,
        }
    }
}

/// Find the first [`KbuildError`] anywhere in an `anyhow` context chain.
pub fn find_kbuild_error(err: &anyhow::Error) -> Option<&KbuildError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<KbuildError>())
}
