// Consistent exit codes for the reposync CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error (bad path, bad config)
//   10 = offline, nothing was sent
//   11 = backend rejected the request
//   13 = network error

use std::process;

use reposync_client::backend::BackendError;
use reposync_client::config::ConfigError;
use reposync_client::flush::FlushError;
use reposync_common::path::PathError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Offline = 10,
    Rejected = 11,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(flush_err) = cause.downcast_ref::<FlushError>() {
                return match flush_err {
                    FlushError::Offline => Self::Offline,
                    FlushError::Backend { source, .. } => Self::from_backend(source),
                    FlushError::Storage(_) => Self::Error,
                };
            }
            if let Some(backend_err) = cause.downcast_ref::<BackendError>() {
                return Self::from_backend(backend_err);
            }
            if cause.downcast_ref::<ConfigError>().is_some()
                || cause.downcast_ref::<PathError>().is_some()
            {
                return Self::Usage;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                if io_err.kind() == std::io::ErrorKind::TimedOut {
                    return Self::Network;
                }
            }
        }

        Self::Error
    }

    fn from_backend(error: &BackendError) -> Self {
        match error {
            BackendError::Network { .. } => Self::Network,
            BackendError::InvalidEndpoint { .. } => Self::Usage,
            error if error.is_rejection() => Self::Rejected,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
