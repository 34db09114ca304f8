//! Error handling for the sorting engine
//!
//! Uses `thiserror` for library errors. Only setup failures surface as
//! `Err`: mask adjustment and sort verification problems are logged and
//! the run continues.

use std::io;
use thiserror::Error;

/// Errors that abort a run before or during startup
#[derive(Error, Debug)]
pub enum SortError {
    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed
    #[error("Failed to load config file {path}: {reason}")]
    Config { path: String, reason: String },

    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),

    /// A signal syscall (sigaction, pthread_sigmask, kill) failed
    #[error("Signal operation failed: {context}: {source}")]
    Signal {
        context: String,
        #[source]
        source: nix::Error,
    },

    /// A worker thread could not be created
    #[error("Failed to create thread {index} for team {team}: {source}")]
    Spawn {
        team: usize,
        index: usize,
        #[source]
        source: io::Error,
    },

    /// The rendezvous barrier could not be built for the requested roster
    #[error("Barrier setup failed: {0}")]
    Barrier(String),

    /// No free slot left in the thread registry
    #[error("Thread registry is full (capacity {capacity})")]
    RegistryFull { capacity: usize },

    /// Another router already owns the process-wide handlers
    #[error("A signal router is already installed in this process")]
    RouterInstalled,

    /// A worker panicked before it could report back
    #[error("Worker {index} of team {team} panicked")]
    WorkerPanicked { team: usize, index: usize },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Attach a description of the failed operation to a nix error
pub trait ErrorContext<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    /// Lazily built context (only evaluated on error)
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> ErrorContext<T> for nix::Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|source| SortError::Signal {
            context: context.into(),
            source,
        })
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|source| SortError::Signal {
            context: f().into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let sort_error: SortError = io_error.into();
        assert!(matches!(sort_error, SortError::Io(_)));
    }

    #[test]
    fn test_error_context() {
        let result: nix::Result<()> = Err(Errno::EINVAL);

        let with_context = result.context("Failed to block signals");
        let error = with_context.unwrap_err();
        assert!(matches!(error, SortError::Signal { .. }));
        assert!(error.to_string().contains("Failed to block signals"));
    }

    #[test]
    fn test_spawn_error_names_thread() {
        let error = SortError::Spawn {
            team: 2,
            index: 3,
            source: io::Error::new(io::ErrorKind::WouldBlock, "resource exhausted"),
        };
        assert_eq!(
            error.to_string(),
            "Failed to create thread 3 for team 2: resource exhausted"
        );
    }
}
