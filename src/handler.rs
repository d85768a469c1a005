//! SIGHUP handler installation and the process-scoped handler context
//!
//! The handler runs at arbitrary points in up to three related
//! processes, so it is restricted to async-signal-safe work: atomic
//! loads/stores on the shared region and one monotonic clock read. No
//! allocation, no locking, no blocking calls.
//!
//! The context the handler needs (the location of the shared region) is
//! a single process-scoped pointer, set by [`install`] and cleared by
//! [`teardown`]. It is inherited by fork along with the mapping itself,
//! but the signal disposition is not guaranteed to survive every
//! delivery path in the form we need, so children re-run [`install`]
//! after fork.

use crate::errors::{ProbeError, ProbeResult};
use crate::shared::{SharedLatencyState, SighupShared};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::time::{clock_gettime, ClockId};
use std::sync::atomic::{AtomicPtr, Ordering};

static HANDLER_STATE: AtomicPtr<SighupShared> = AtomicPtr::new(std::ptr::null_mut());

/// Monotonic wall-clock reading in seconds. Async-signal-safe.
pub fn time_now() -> f64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as f64 + ts.tv_nsec() as f64 * 1e-9,
        // CLOCK_MONOTONIC cannot realistically fail; 0.0 reads as
        // "unarmed" everywhere downstream.
        Err(_) => 0.0,
    }
}

extern "C" fn on_sighup(_signum: libc::c_int) {
    let ptr = HANDLER_STATE.load(Ordering::SeqCst);
    // Null only if the handler fires outside install/teardown, e.g.
    // SIGHUP from an unrelated source. Nothing to record then.
    let Some(shared) = (unsafe { ptr.as_ref() }) else {
        return;
    };
    let t_start = shared.t_start();
    let latency = time_now() - t_start;
    shared.set_signalled(true);
    // Guard against firing while unarmed and against clock skew across
    // the process boundary. A filtered sample is tolerated, not an error.
    if t_start > 0.0 && latency > 0.0 {
        shared.record_sample(latency);
    }
}

/// Point the handler context at `state` and install the SIGHUP handler.
/// Safe to call repeatedly; each forked child that may receive the
/// signal calls it again defensively.
pub fn install(state: &SharedLatencyState) -> ProbeResult<()> {
    HANDLER_STATE.store(state.as_ptr(), Ordering::SeqCst);
    let action = SigAction::new(
        SigHandler::Handler(on_sighup),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGHUP, &action) }
        .map_err(ProbeError::HandlerInstall)?;
    Ok(())
}

/// Restore the default SIGHUP disposition and drop the context. Must
/// run before the shared region is unmapped.
pub fn teardown() {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let _ = unsafe { signal::sigaction(Signal::SIGHUP, &action) };
    HANDLER_STATE.store(std::ptr::null_mut(), Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The handler context is process-wide; these tests must not overlap.
    static HANDLER_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_time_now_is_monotonic() {
        let a = time_now();
        let b = time_now();
        assert!(a > 0.0);
        assert!(b >= a);
    }

    #[test]
    fn test_armed_raise_records_a_sample() {
        let _guard = HANDLER_LOCK.lock().unwrap();
        let state = SharedLatencyState::acquire().expect("mmap failed");
        install(&state).expect("install failed");

        state.arm(time_now());
        signal::raise(Signal::SIGHUP).expect("raise failed");

        assert!(state.signalled());
        assert_eq!(state.sample_count(), 1.0);
        assert!(state.cumulative_latency() > 0.0);
        teardown();
    }

    #[test]
    fn test_unarmed_raise_records_no_sample() {
        let _guard = HANDLER_LOCK.lock().unwrap();
        let state = SharedLatencyState::acquire().expect("mmap failed");
        install(&state).expect("install failed");

        state.disarm();
        signal::raise(Signal::SIGHUP).expect("raise failed");

        // Handler fired but the positivity guard filtered the sample.
        assert!(state.signalled());
        assert_eq!(state.sample_count(), 0.0);
        teardown();
    }
}
