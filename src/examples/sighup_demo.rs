//! Minimal driver loop for the SIGHUP latency probe
//!
//! Runs N attempts (first argument, default 1000), counting an
//! operation per successful attempt, and reports the mean SIGHUP
//! delivery latency in nanoseconds. A host that cannot provide the
//! shared state region is a skip, not a failure.

use anyhow::Result;
use sighup_latency_rs::{Outcome, Phase, SighupProbe};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let attempts: u64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(1000);

    let mut probe = match SighupProbe::new() {
        Ok(probe) => probe,
        Err(err) if err.is_resource_exhaustion() => {
            eprintln!("sighup_demo: {err}, skipping benchmark");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    probe.on_phase(|phase: Phase| {
        tracing::info!(?phase, "phase transition");
    });

    let mut bogo_ops: u64 = 0;
    for _ in 0..attempts {
        match probe.run_one_attempt() {
            Outcome::Success => bogo_ops += 1,
            Outcome::Skipped => {}
            Outcome::Fatal(err) => {
                drop(probe);
                eprintln!("sighup_demo: {err}");
                std::process::exit(1);
            }
        }
    }

    let summary = probe.summary();
    println!("ops: {bogo_ops}");
    println!("samples: {}", summary.samples);
    println!("mean SIGHUP latency: {:.1} ns", summary.mean_nanos());
    Ok(())
}
