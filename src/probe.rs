//! The two SIGHUP delivery probes
//!
//! `direct_raise` measures delivery of a self-raised SIGHUP in a forked
//! child. `orphaned_group` measures delivery performed by the kernel's
//! job-control machinery: a process group that becomes orphaned while
//! holding a stopped member is sent SIGHUP followed by SIGCONT, with no
//! kill call anywhere in the code path.

use crate::errors::{ProbeError, ProbeResult};
use crate::handler::{self, time_now};
use crate::metrics::LatencySummary;
use crate::reap;
use crate::shared::SharedLatencyState;
use crate::util::{coin_flip, RetryPolicy};
use nix::errno::Errno;
use nix::sys::signal::{kill, raise, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, getpid, pipe, read, setpgid, write, ForkResult, Pid};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Result of one probe attempt. The driver increments its operation
/// counter on `Success` and stops the run on `Fatal`; `Skipped` means
/// the attempt could not run but nothing is wrong.
#[derive(Debug)]
pub enum Outcome {
    Success,
    Skipped,
    Fatal(ProbeError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Advisory lifecycle notifications for external observability. No
/// probe logic depends on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    TearingDown,
}

/// Lifecycle of one orphaned-group attempt.
///
/// `LeafStopped -> GroupOrphaned` happens when the intermediate process
/// kills itself; `GroupOrphaned -> Delivered` is performed entirely by
/// the kernel's job-control rules. A host OS that never makes that last
/// transition yields zero samples, which is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    Idle,
    LeafStopped,
    GroupOrphaned,
    Delivered,
}

type PhaseObserver = Box<dyn Fn(Phase) + Send>;

/// One worker's probe instance: owns the shared region, the fork retry
/// policy and the driver's continue predicate.
pub struct SighupProbe {
    state: SharedLatencyState,
    retry: RetryPolicy,
    keep_going: Arc<AtomicBool>,
    observer: Option<PhaseObserver>,
    started: bool,
}

impl SighupProbe {
    /// Map the shared state and install the SIGHUP handler.
    ///
    /// A `SharedStateUnavailable` error means the host could not
    /// provide the shared mapping; callers should skip the benchmark
    /// rather than report a failure.
    pub fn new() -> ProbeResult<Self> {
        Self::with_retry(RetryPolicy::default())
    }

    pub fn with_retry(retry: RetryPolicy) -> ProbeResult<Self> {
        let state = SharedLatencyState::acquire()?;
        handler::install(&state)?;
        let probe = Self {
            state,
            retry,
            keep_going: Arc::new(AtomicBool::new(true)),
            observer: None,
            started: false,
        };
        probe.notify(Phase::Initializing);
        Ok(probe)
    }

    /// The "still supposed to continue" flag. The driver clears it when
    /// its own budget runs out; an in-flight attempt still completes so
    /// no stopped descendant is left behind.
    pub fn keep_going(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.keep_going)
    }

    /// Register the advisory phase observer.
    pub fn on_phase(&mut self, observer: impl Fn(Phase) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Run one attempt, choosing the delivery path by coin flip.
    pub fn run_one_attempt(&mut self) -> Outcome {
        if !self.started {
            self.started = true;
            self.notify(Phase::Running);
        }
        if coin_flip() {
            self.direct_raise()
        } else {
            self.orphaned_group()
        }
    }

    /// Path (a): a forked child raises SIGHUP on itself.
    pub fn direct_raise(&mut self) -> Outcome {
        match self.direct_raise_inner() {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Fatal(err),
        }
    }

    fn direct_raise_inner(&mut self) -> ProbeResult<Outcome> {
        self.state.reset_for_attempt();
        let forked = match self.fork_with_retry()? {
            Some(forked) => forked,
            None => return Ok(Outcome::Skipped),
        };
        match forked {
            ForkResult::Child => {
                // Raising SIGHUP without a handler would kill us here.
                let _ = handler::install(&self.state);
                self.state.arm(time_now());
                let _ = raise(Signal::SIGHUP);
                // Straight out: inherited resources belong to the parent
                // and must not be torn down twice.
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => {
                wait_reaped(child)?;
                if !self.state.signalled() {
                    // The wait succeeded but the handler never fired:
                    // the signal was lost or mis-delivered.
                    return Err(ProbeError::HandlerNotInvoked {
                        path: "direct-raise",
                    });
                }
                Ok(Outcome::Success)
            }
        }
    }

    /// Path (b): kernel-side delivery to a stopped member of a process
    /// group that becomes orphaned.
    pub fn orphaned_group(&mut self) -> Outcome {
        match self.orphaned_group_inner() {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Fatal(err),
        }
    }

    fn orphaned_group_inner(&mut self) -> ProbeResult<Outcome> {
        handler::install(&self.state)?;
        self.state.reset_for_attempt();
        self.state.set_watched_pid(0);
        let forked = match self.fork_with_retry()? {
            Some(forked) => forked,
            None => return Ok(Outcome::Skipped),
        };
        match forked {
            ForkResult::Child => middle_process(&self.state),
            ForkResult::Parent { child } => {
                let wait_result = wait_reaped(child);
                // Mandatory cleanup, ordered before any error return:
                // the leaf is a grandchild, a plain wait cannot collect
                // it, and a stopped leaf would otherwise sit in the
                // process table forever.
                let leaf = self.state.watched_pid();
                if leaf != 0 {
                    reap::force_reap(Pid::from_raw(leaf));
                    self.state.set_watched_pid(0);
                }
                wait_result?;
                let final_phase = if self.state.signalled() {
                    GroupPhase::Delivered
                } else {
                    GroupPhase::GroupOrphaned
                };
                tracing::debug!(leaf, ?final_phase, "orphaned-group attempt finished");
                Ok(Outcome::Success)
            }
        }
    }

    /// Snapshot of the accumulated samples.
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            samples: self.state.sample_count(),
            total_latency_secs: self.state.cumulative_latency(),
        }
    }

    /// Mean seconds per delivery, `0.0` with no samples.
    pub fn rate(&self) -> f64 {
        self.summary().mean_secs()
    }

    pub fn sample_count(&self) -> f64 {
        self.state.sample_count()
    }

    /// Pid of a leaf still awaiting reaping, `0` when none is pending.
    pub fn watched_pid(&self) -> i32 {
        self.state.watched_pid()
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    /// Fork under the retry policy. `Ok(None)` means the attempts ran
    /// out while the driver had already asked to stop: benign, skip.
    fn fork_with_retry(&self) -> ProbeResult<Option<ForkResult>> {
        let mut delay = self.retry.delay;
        let mut last = Errno::EAGAIN;
        for attempt in 1..=self.retry.max_attempts {
            match unsafe { fork() } {
                Ok(forked) => return Ok(Some(forked)),
                Err(err) => {
                    last = err;
                    if !self.keep_going.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    tracing::debug!(attempt, %err, "fork failed, backing off");
                    if attempt < self.retry.max_attempts {
                        thread::sleep(delay);
                        delay = self.retry.next_delay(delay);
                    }
                }
            }
        }
        Err(ProbeError::ForkExhausted {
            attempts: self.retry.max_attempts,
            source: last,
        })
    }

    fn notify(&self, phase: Phase) {
        tracing::debug!(?phase, "probe phase");
        if let Some(observer) = &self.observer {
            observer(phase);
        }
    }
}

impl Drop for SighupProbe {
    fn drop(&mut self) {
        self.notify(Phase::TearingDown);
        // Disposition back to default before the region goes away, so a
        // late SIGHUP cannot touch unmapped memory.
        handler::teardown();
    }
}

/// The intermediate process (L1): builds the group that its own death
/// will orphan. Terminates by SIGKILL on the success path, so nothing
/// after the fork may depend on running drops.
fn middle_process(state: &SharedLatencyState) -> ! {
    let (rendezvous_rx, rendezvous_tx) = match pipe() {
        Ok(fds) => fds,
        Err(_) => unsafe { libc::_exit(0) },
    };
    state.disarm();
    match unsafe { fork() } {
        Err(_) => unsafe { libc::_exit(0) },
        Ok(ForkResult::Child) => leaf_process(state, rendezvous_tx),
        Ok(ForkResult::Parent { child: leaf }) => {
            state.set_watched_pid(leaf.as_raw());
            // Leader of its own group: once we die, no member has a
            // living parent outside the group in this session.
            let _ = setpgid(leaf, leaf);
            // Rendezvous: block until the leaf has written its
            // readiness byte and is about to stop itself. Our copy of
            // the write end must close first, so a leaf dying early
            // shows up as EOF instead of hanging this read.
            drop(rendezvous_tx);
            let mut byte = [0u8; 1];
            let _ = read(rendezvous_rx.as_raw_fd(), &mut byte);
            state.arm(time_now());
            // Uncatchable exit. The kernel notices the orphaned group
            // holding a stopped member and delivers SIGHUP + SIGCONT.
            let _ = kill(getpid(), Signal::SIGKILL);
            unsafe { libc::_exit(0) }
        }
    }
}

/// The leaf (L2): announces itself, then stops and waits for the
/// kernel-delivered SIGHUP/SIGCONT pair or a forced reap.
fn leaf_process(state: &SharedLatencyState, rendezvous_tx: OwnedFd) -> ! {
    let _ = handler::install(state);
    state.set_watched_pid(getpid().as_raw());
    if write(&rendezvous_tx, b"x").unwrap_or(0) < 1 {
        unsafe { libc::_exit(0) }
    }
    let _ = kill(getpid(), Signal::SIGSTOP);
    // Only reached after the continuation signal.
    unsafe { libc::_exit(0) }
}

/// Wait for a direct child, retrying across unrelated-signal
/// interruptions. Any other wait failure is a hard probe failure.
fn wait_reaped(child: Pid) -> ProbeResult<WaitStatus> {
    loop {
        match waitpid(child, None) {
            Ok(status) => return Ok(status),
            Err(Errno::EINTR) => continue,
            Err(err) => {
                return Err(ProbeError::WaitFailed {
                    pid: child.as_raw(),
                    source: err,
                })
            }
        }
    }
}
