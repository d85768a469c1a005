//! Error types for the SIGHUP latency probe
//!
//! Uses `thiserror` for library errors with detailed error types
//! that consumers can match on and handle appropriately. The one
//! variant callers must be able to single out is
//! [`ProbeError::SharedStateUnavailable`]: it means "skip this
//! benchmark", not "the benchmark failed".

use nix::errno::Errno;
use thiserror::Error;

/// Custom error type for probe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The shared state region could not be mapped. Resource
    /// exhaustion at setup: callers should skip the benchmark.
    #[error("failed to map shared probe state: {0}")]
    SharedStateUnavailable(Errno),

    /// Installing the SIGHUP handler failed
    #[error("failed to install SIGHUP handler: {0}")]
    HandlerInstall(Errno),

    /// Fork kept failing while the benchmark was still supposed to
    /// continue. Systemic, not probe-specific.
    #[error("fork failed after {attempts} attempts: {source}")]
    ForkExhausted { attempts: u32, source: Errno },

    /// A wait on a child failed for a reason other than being
    /// interrupted by an unrelated signal
    #[error("waitpid on pid {pid} failed: {source}")]
    WaitFailed { pid: i32, source: Errno },

    /// The handler never fired after a direct raise. A lost or
    /// mis-delivered signal is a correctness bug, never transient.
    #[error("SIGHUP handler was not invoked ({path} path)")]
    HandlerNotInvoked { path: &'static str },
}

impl ProbeError {
    /// True for the "skip, don't fail" setup condition
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::SharedStateUnavailable(_))
    }
}

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhaustion_is_distinct() {
        let err = ProbeError::SharedStateUnavailable(Errno::ENOMEM);
        assert!(err.is_resource_exhaustion());

        let err = ProbeError::HandlerNotInvoked {
            path: "direct-raise",
        };
        assert!(!err.is_resource_exhaustion());
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = ProbeError::HandlerNotInvoked {
            path: "direct-raise",
        };
        assert!(err.to_string().contains("direct-raise"));

        let err = ProbeError::WaitFailed {
            pid: 42,
            source: Errno::ECHILD,
        };
        assert!(err.to_string().contains("42"));
    }
}
