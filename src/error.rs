use crate::service::ServiceState;
use std::time::Duration;
use thiserror::Error;

/// Exit status for a worker that returned an error.
pub const EXIT_WORKER_FAILURE: i32 = 1;

/// Exit status for failed administrative commands and setup errors.
pub const EXIT_ADMIN_FAILURE: i32 = 2;

#[derive(Error, Debug)]
pub enum SvcError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setup error: {message}")]
    Setup { message: String },

    #[error("{action} failed: {message}")]
    Admin { action: String, message: String },

    #[error("{action}: timeout waiting for service to go to state={target} after {waited:?}")]
    Timeout {
        action: String,
        target: ServiceState,
        waited: Duration,
    },

    #[error("invalid command {0}")]
    InvalidCommand(String),

    #[error("Unsupported: {message}")]
    Unsupported { message: String },
}

impl SvcError {
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    pub fn admin<A: Into<String>, M: Into<String>>(action: A, message: M) -> Self {
        Self::Admin {
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// Everything the controller itself can fail on happens before or instead
    /// of running the worker, so all of it shares the administrative status.
    pub fn exit_code(&self) -> i32 {
        EXIT_ADMIN_FAILURE
    }

    /// Whether the usage text should accompany this error on stderr.
    pub fn wants_usage(&self) -> bool {
        matches!(self, SvcError::InvalidCommand(_))
    }
}

pub type Result<T> = std::result::Result<T, SvcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_rejection() {
        let timeout = SvcError::Timeout {
            action: "stop".to_string(),
            target: ServiceState::Stopped,
            waited: Duration::from_secs(10),
        };
        let rejected = SvcError::admin("stop", "unit not loaded");

        assert!(timeout.to_string().contains("timeout waiting for service"));
        assert!(!rejected.to_string().contains("timeout"));
        assert_eq!(timeout.exit_code(), EXIT_ADMIN_FAILURE);
        assert_ne!(EXIT_ADMIN_FAILURE, EXIT_WORKER_FAILURE);
    }

    #[test]
    fn test_only_invalid_command_wants_usage() {
        assert!(SvcError::InvalidCommand("bogus".to_string()).wants_usage());
        assert!(!SvcError::setup("no signals").wants_usage());
    }
}
