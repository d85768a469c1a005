//! Forced reaping of probe descendants
//!
//! The orphaned-group path leaves behind a leaf that is not a direct
//! child of the top process, so a plain wait cannot collect it. This
//! collaborator locates it by pid: kill, then wait/poll until it is out
//! of the process table. SIGKILL terminates a stopped process without a
//! preceding SIGCONT.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::thread;
use std::time::{Duration, Instant};

const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Wait for `pid` to leave the process table, forcing termination
/// first. Works for non-children: once the leaf's parent is gone it
/// reparents to init (or a subreaper), which collects the zombie; we
/// poll its existence with the null signal until then.
pub fn force_reap(pid: Pid) {
    let _ = kill(pid, Signal::SIGKILL);
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(_) => return,
            Err(Errno::EINTR) => continue,
            // ECHILD: not ours to wait on, poll existence instead.
            Err(_) => {
                if kill(pid, None) == Err(Errno::ESRCH) {
                    return;
                }
            }
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                pid = pid.as_raw(),
                "probe process outlived forced reap, leaking it"
            );
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
