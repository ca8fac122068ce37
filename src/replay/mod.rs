//! Trace replay: configuration, entry point, and the scheduler behind it.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pipeline`] | Per-call snapshot/dispatch/accounting/dump-gate pipeline |
//! | [`race`] | Baton-passing scheduler preserving recorded thread identity |
//!
//! The public surface is [`replay`]: wire a [`CallSource`], a [`Driver`],
//! and an [`OutputSink`] together under a [`ReplayConfig`] and run the trace
//! to completion. Replay is strictly serial across recorded threads;
//! concurrency exists only to keep each recorded thread's calls on a stable
//! OS thread for backends with thread-local state.

mod pipeline;
mod race;

use crate::callset::CallSet;
use crate::driver::{Driver, DriverOptions};
use crate::output::OutputSink;
use crate::profile::ProfileOptions;
use crate::trace::CallSource;
use pipeline::Pipeline;
use race::Race;
use std::sync::Arc;

/// Replay configuration.
///
/// Snapshot and compare stay off while their frequency sets are empty; the
/// CLI defaults both to every frame when the corresponding prefix is given.
#[derive(Clone, Debug, Default)]
pub struct ReplayConfig {
    /// Snapshot file prefix; `"-"` writes PNM to the sink instead of PNG
    /// files.
    pub snapshot_prefix: Option<String>,
    /// Reference image prefix for comparison.
    pub compare_prefix: Option<String>,
    /// Calls to snapshot.
    pub snapshot_frequency: CallSet,
    /// Calls to compare against references.
    pub compare_frequency: CallSet,
    /// Dump driver state and stop at the first call with `no >=` this
    /// index.
    pub dump_state_at: Option<u32>,
    /// Output verbosity; negative values silence progress lines.
    pub verbosity: i32,
    /// Profiling modes.
    pub profile: ProfileOptions,
    /// Backend options forwarded to the driver before the first call.
    pub driver_options: DriverOptions,
}

/// End-of-run counter values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Frames completed (END_FRAME calls dispatched).
    pub frames: u32,
    /// Index of the last dispatched call.
    pub last_call_no: u32,
    /// Calls dispatched.
    pub calls: u64,
    /// Dispatch failures (logged and skipped).
    pub dispatch_errors: u64,
    /// Snapshot PNG files written.
    pub snapshots_written: u64,
    /// Reference comparisons performed.
    pub compares: u64,
}

/// How the replay ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The source reached end-of-stream.
    Completed,
    /// The state-dump gate fired; the caller should exit successfully
    /// without replaying further traces.
    StoppedAtStateDump,
}

/// Result of one replay run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayReport {
    pub stats: ReplayStats,
    pub outcome: ReplayOutcome,
}

/// Replays a call stream against a driver.
///
/// Runs the scheduler on the calling thread (the lead worker), spawning one
/// worker thread per additional recorded thread id encountered; all of them
/// are joined before this returns. Profiling rows, snapshot lines, compare
/// results, and state dumps are written to `sink`.
pub fn replay(
    source: Box<dyn CallSource>,
    driver: Box<dyn Driver>,
    sink: Arc<dyn OutputSink>,
    config: ReplayConfig,
) -> ReplayReport {
    let pipeline = Pipeline::new(source, driver, Arc::clone(&sink), config);
    let race = Race::new(pipeline);
    let pipeline = race.run();

    pipeline.profiler.write_report(&*sink);

    let outcome = if pipeline.stopped_at_dump {
        ReplayOutcome::StoppedAtStateDump
    } else {
        ReplayOutcome::Completed
    };
    ReplayReport {
        stats: ReplayStats {
            frames: pipeline.frame_no,
            last_call_no: pipeline.call_no,
            calls: pipeline.calls_dispatched,
            dispatch_errors: pipeline.dispatch_errors,
            snapshots_written: pipeline.snapshots_written,
            compares: pipeline.compares,
        },
        outcome,
    }
}
