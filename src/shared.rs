//! Shared probe state, visible across fork boundaries
//!
//! The benchmark coordinates a top process, an intermediate child and a
//! stopped leaf through one fixed-layout region mapped with
//! `MAP_SHARED | MAP_ANONYMOUS`. The mapping survives fork at a stable
//! address, so a pointer taken before the fork is valid in every
//! descendant. Fields are atomics: the signal handler and up to three
//! processes touch them with no locking, and the races that remain are
//! the very thing the benchmark measures. `f64` accumulators are kept
//! as bit patterns in `AtomicU64` so the handler stays async-signal-safe.

use crate::errors::{ProbeError, ProbeResult};
use nix::errno::Errno;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// The in-region layout. One instance per worker, never more.
///
/// Write ownership per attempt: `t_start` is armed by exactly one
/// process before the signal-inducing action; `signalled`,
/// `sample_count` and `cumulative_latency` are written by the handler
/// invocation; `watched_pid` by the leaf and its immediate parent.
#[repr(C)]
pub struct SighupShared {
    signalled: AtomicBool,
    watched_pid: AtomicI32,
    sample_count: AtomicU64,
    cumulative_latency: AtomicU64,
    t_start: AtomicU64,
}

#[inline]
fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::SeqCst))
}

#[inline]
fn store_f64(cell: &AtomicU64, value: f64) {
    cell.store(value.to_bits(), Ordering::SeqCst);
}

impl SighupShared {
    pub fn signalled(&self) -> bool {
        self.signalled.load(Ordering::SeqCst)
    }

    pub fn set_signalled(&self, value: bool) {
        self.signalled.store(value, Ordering::SeqCst);
    }

    pub fn watched_pid(&self) -> i32 {
        self.watched_pid.load(Ordering::SeqCst)
    }

    pub fn set_watched_pid(&self, pid: i32) {
        self.watched_pid.store(pid, Ordering::SeqCst);
    }

    /// Timestamp of the last arming, in monotonic seconds. `0.0` means
    /// unarmed; a handler firing then must not record a sample.
    pub fn t_start(&self) -> f64 {
        load_f64(&self.t_start)
    }

    pub fn arm(&self, now: f64) {
        store_f64(&self.t_start, now);
    }

    pub fn disarm(&self) {
        store_f64(&self.t_start, 0.0);
    }

    pub fn is_armed(&self) -> bool {
        self.t_start() > 0.0
    }

    pub fn sample_count(&self) -> f64 {
        load_f64(&self.sample_count)
    }

    pub fn cumulative_latency(&self) -> f64 {
        load_f64(&self.cumulative_latency)
    }

    /// Add one latency sample. Callers must have applied the positivity
    /// guard first; there is at most one recording writer per attempt,
    /// so the read-add-store pair does not race with itself.
    pub fn record_sample(&self, latency_secs: f64) {
        store_f64(
            &self.cumulative_latency,
            self.cumulative_latency() + latency_secs,
        );
        store_f64(&self.sample_count, self.sample_count() + 1.0);
    }

    /// Clear the per-attempt fields so attempt N+1 starts unarmed even
    /// when attempt N never saw a delivery.
    pub fn reset_for_attempt(&self) {
        self.set_signalled(false);
        self.disarm();
    }
}

/// RAII owner of the shared mapping.
///
/// Created once per worker instance and unmapped exactly once, by the
/// owning process, after every descendant referencing it has exited.
/// Forked children leave through `_exit` and never run this drop, so
/// the unmap cannot happen twice.
pub struct SharedLatencyState {
    shared: NonNull<SighupShared>,
}

impl SharedLatencyState {
    /// Map the region. Failure here is resource exhaustion at setup:
    /// the benchmark should be skipped, not failed.
    pub fn acquire() -> ProbeResult<Self> {
        let len = mem::size_of::<SighupShared>();
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ProbeError::SharedStateUnavailable(Errno::last()));
        }
        // Anonymous pages come back zeroed, which is exactly the
        // unarmed state: count 0.0, t_start 0.0, no watched pid.
        let shared = NonNull::new(ptr.cast::<SighupShared>())
            .ok_or(ProbeError::SharedStateUnavailable(Errno::ENOMEM))?;
        Ok(Self { shared })
    }

    /// Raw pointer into the mapping, for the signal-handler context.
    /// Stable across fork because the mapping is shared.
    pub fn as_ptr(&self) -> *mut SighupShared {
        self.shared.as_ptr()
    }

    /// Unmap the region. Equivalent to dropping, spelled out for
    /// callers that want the teardown explicit.
    pub fn release(self) {}
}

impl Deref for SharedLatencyState {
    type Target = SighupShared;

    fn deref(&self) -> &SighupShared {
        unsafe { self.shared.as_ref() }
    }
}

impl Drop for SharedLatencyState {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(
                self.shared.as_ptr().cast(),
                mem::size_of::<SighupShared>(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    #[test]
    fn test_acquire_starts_zeroed() {
        let state = SharedLatencyState::acquire().expect("mmap failed");
        assert!(!state.signalled());
        assert_eq!(state.watched_pid(), 0);
        assert_eq!(state.sample_count(), 0.0);
        assert_eq!(state.cumulative_latency(), 0.0);
        assert!(!state.is_armed());
    }

    #[test]
    fn test_record_sample_accumulates() {
        let state = SharedLatencyState::acquire().expect("mmap failed");
        state.record_sample(0.5);
        state.record_sample(0.25);
        assert_eq!(state.sample_count(), 2.0);
        assert_eq!(state.cumulative_latency(), 0.75);
    }

    #[test]
    fn test_reset_for_attempt_clears_signalled_and_arming() {
        let state = SharedLatencyState::acquire().expect("mmap failed");
        state.set_signalled(true);
        state.arm(123.0);
        state.reset_for_attempt();
        assert!(!state.signalled());
        assert!(!state.is_armed());
    }

    #[test]
    fn test_child_writes_are_visible_to_parent() {
        let state = SharedLatencyState::acquire().expect("mmap failed");
        match unsafe { fork() }.expect("fork failed") {
            ForkResult::Child => {
                state.set_signalled(true);
                state.set_watched_pid(nix::unistd::getpid().as_raw());
                state.record_sample(0.001);
                unsafe { libc::_exit(0) };
            }
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).expect("waitpid failed");
                assert_eq!(status, WaitStatus::Exited(child, 0));
                assert!(state.signalled());
                assert_eq!(state.watched_pid(), child.as_raw());
                assert_eq!(state.sample_count(), 1.0);
            }
        }
    }
}
