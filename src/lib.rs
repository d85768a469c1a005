//! SIGHUP delivery-latency probe
//!
//! Measures end-to-end latency of asynchronous signal delivery over two
//! paths: a forked child raising SIGHUP on itself, and the kernel's
//! job-control machinery delivering SIGHUP to a stopped member of a
//! process group that becomes orphaned. Cooperating processes share one
//! mmap'd state region; a driver loop calls
//! [`SighupProbe::run_one_attempt`] and reads the mean latency at the
//! end.

pub mod errors;
pub mod handler;
pub mod metrics;
pub mod probe;
pub mod reap;
pub mod shared;
pub mod util;

// Re-export commonly used types
pub use errors::{ProbeError, ProbeResult};
pub use metrics::{harmonic_mean, LatencySummary};
pub use probe::{GroupPhase, Outcome, Phase, SighupProbe};
pub use shared::SharedLatencyState;
pub use util::RetryPolicy;
