//! Per-call replay pipeline.
//!
//! Everything that happens to a single call once a worker holds it: the
//! snapshot decision, dispatch, frame/call accounting, profiling stamps,
//! and the state-dump gate. The scheduler owns exactly one [`Pipeline`] and
//! hands exclusive access to whichever worker holds the baton.
//!
//! # Snapshot decision
//!
//! A call is snapshotted when either the snapshot or the compare frequency
//! selects it. Calls that change the visible render target are snapshotted
//! *before* dispatch: for frame-ending swaps the image is filed under the
//! call's own number (the visible image is that frame's result even though
//! the swap has not executed yet), for plain target changes under the
//! previous call's number (the content being discarded belongs to the
//! previous call). All other snapshots happen after dispatch, under the
//! call's own number.

use crate::driver::Driver;
use crate::image::Image;
use crate::output::OutputSink;
use crate::profile::Profiler;
use crate::trace::{Call, CallSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::ReplayConfig;

/// What the worker should do after a call completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallControl {
    /// Keep pulling calls.
    Continue,
    /// The state-dump gate fired; wind the replay down.
    Stop,
}

/// Ten-digit zero-padded snapshot name. The on-disk contract.
fn snapshot_filename(prefix: &str, no: u32) -> String {
    format!("{prefix}{no:010}.png")
}

/// Shared replay state: source, driver, sink, counters.
///
/// Accessed only by the worker currently holding the baton; the scheduler
/// serializes access with a single mutex held across each leg run.
pub(crate) struct Pipeline {
    source: Box<dyn CallSource>,
    driver: Box<dyn Driver>,
    sink: Arc<dyn OutputSink>,
    config: ReplayConfig,
    pub(crate) profiler: Profiler,

    /// Index of the most recently dispatched call.
    pub(crate) call_no: u32,
    /// Frames completed so far (END_FRAME calls dispatched).
    pub(crate) frame_no: u32,
    /// Calls dispatched.
    pub(crate) calls_dispatched: u64,
    /// Dispatch failures (logged and skipped).
    pub(crate) dispatch_errors: u64,
    /// Snapshot PNG files written.
    pub(crate) snapshots_written: u64,
    /// Reference comparisons performed.
    pub(crate) compares: u64,
    /// Set when the state-dump gate fired.
    pub(crate) stopped_at_dump: bool,
}

impl Pipeline {
    pub(crate) fn new(
        source: Box<dyn CallSource>,
        mut driver: Box<dyn Driver>,
        sink: Arc<dyn OutputSink>,
        config: ReplayConfig,
    ) -> Pipeline {
        driver.configure(&config.driver_options);
        let profiler = Profiler::new(config.profile);
        Pipeline {
            source,
            driver,
            sink,
            config,
            profiler,
            call_no: 0,
            frame_no: 0,
            calls_dispatched: 0,
            dispatch_errors: 0,
            snapshots_written: 0,
            compares: 0,
            stopped_at_dump: false,
        }
    }

    /// Pulls the next call from the source.
    pub(crate) fn next_call(&mut self) -> Option<Call> {
        self.source.next_call()
    }

    /// Completes buffered rendering before a handoff or shutdown.
    pub(crate) fn flush_rendering(&mut self) {
        self.driver.flush();
    }

    /// Runs one call through snapshot, dispatch, accounting, and the
    /// state-dump gate.
    pub(crate) fn retrace_call(&mut self, call: &Call) -> CallControl {
        let swap_rt = call.swaps_render_target();
        let do_snapshot = self.config.snapshot_frequency.contains(call)
            || self.config.compare_frequency.contains(call);

        if do_snapshot && swap_rt {
            let no = if call.ends_frame() {
                call.no
            } else {
                call.no.saturating_sub(1)
            };
            self.take_snapshot(no);
        }

        self.call_no = call.no;

        let profiling = self.profiler.enabled();
        let started = profiling.then(Instant::now);
        let pixels_before = if profiling {
            self.driver.pixels_drawn()
        } else {
            None
        };

        if let Err(err) = self.driver.execute(call) {
            self.dispatch_errors += 1;
            if self.config.verbosity >= 0 {
                eprintln!("warning: call {} ({}): {err}", call.no, call.op.name());
            }
        }
        self.calls_dispatched += 1;

        if let Some(started) = started {
            let pixels = match (pixels_before, self.driver.pixels_drawn()) {
                (Some(before), Some(after)) => Some(after.saturating_sub(before)),
                _ => None,
            };
            self.profiler.record_call(call, started.elapsed(), pixels);
        }

        if call.ends_frame() {
            self.frame_no += 1;
            self.profiler.record_frame(self.frame_no);
        }

        if do_snapshot && !swap_rt {
            self.take_snapshot(call.no);
        }

        if let Some(threshold) = self.config.dump_state_at {
            if call.no >= threshold && self.dump_state() {
                self.stopped_at_dump = true;
                return CallControl::Stop;
            }
        }
        CallControl::Continue
    }

    /// Reads the reference (if comparing), captures the framebuffer, writes
    /// the snapshot (if requested), and prints the compare result.
    ///
    /// Missing reference files and failed captures skip silently.
    fn take_snapshot(&mut self, no: u32) {
        let mut reference: Option<Image> = None;
        if let Some(prefix) = &self.config.compare_prefix {
            let filename = snapshot_filename(prefix, no);
            if let Some(image) = Image::read_png(Path::new(&filename)) {
                if self.config.verbosity >= 0 {
                    self.sink.write_line(&format!("Read {filename}"));
                }
                reference = Some(image);
            }
        }

        let Some(captured) = self.driver.snapshot() else {
            return;
        };

        if let Some(prefix) = &self.config.snapshot_prefix {
            if prefix == "-" {
                let mut pnm = Vec::new();
                captured
                    .write_pnm(&mut pnm, &no.to_string())
                    .expect("writing PNM into memory cannot fail");
                self.sink.write_all(&pnm);
            } else {
                let filename = snapshot_filename(prefix, no);
                match captured.write_png(Path::new(&filename)) {
                    Ok(()) => {
                        self.snapshots_written += 1;
                        if self.config.verbosity >= 0 {
                            self.sink.write_line(&format!("Wrote {filename}"));
                        }
                    }
                    Err(err) => {
                        eprintln!("error: failed to write {filename}: {err}");
                    }
                }
            }
        }

        if let Some(reference) = reference {
            let bits = captured.compare(&reference);
            self.compares += 1;
            self.sink
                .write_line(&format!("Snapshot {no} average precision of {bits} bits"));
        }
    }

    /// Emits the driver state dump. Returns false when the driver does not
    /// support dumping, in which case the gate must not fire.
    fn dump_state(&mut self) -> bool {
        let Some(state) = self.driver.state() else {
            return false;
        };
        let pretty =
            serde_json::to_string_pretty(&state).unwrap_or_else(|_| state.to_string());
        self.sink.write_line(&pretty);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callset::CallSet;
    use crate::driver::RecordingDriver;
    use crate::output::VecSink;
    use crate::trace::{CallOp, VecSource};

    fn pipeline_with(
        driver: RecordingDriver,
        config: ReplayConfig,
        sink: Arc<VecSink>,
    ) -> Pipeline {
        Pipeline::new(
            Box::new(VecSource::new(Vec::new())),
            Box::new(driver),
            sink,
            config,
        )
    }

    #[test]
    fn counters_track_dispatch() {
        let (driver, _log) = RecordingDriver::new();
        let sink = Arc::new(VecSink::new());
        let mut p = pipeline_with(driver, ReplayConfig::default(), sink);
        assert_eq!(
            p.retrace_call(&Call::new(1, 0, CallOp::FrameEnd)),
            CallControl::Continue
        );
        assert_eq!(
            p.retrace_call(&Call::new(2, 0, CallOp::Present)),
            CallControl::Continue
        );
        assert_eq!(p.call_no, 2);
        assert_eq!(p.frame_no, 2);
        assert_eq!(p.calls_dispatched, 2);
    }

    #[test]
    fn dispatch_errors_are_counted_not_fatal() {
        let (driver, log) = RecordingDriver::new();
        let driver = driver.failing_calls(&[1]);
        let sink = Arc::new(VecSink::new());
        let mut config = ReplayConfig::default();
        config.verbosity = -1;
        let mut p = pipeline_with(driver, config, sink);
        assert_eq!(
            p.retrace_call(&Call::new(1, 0, CallOp::Present)),
            CallControl::Continue
        );
        assert_eq!(p.dispatch_errors, 1);
        assert_eq!(log.executed_nos(), vec![1]);
    }

    #[test]
    fn dump_gate_requires_driver_support() {
        let (driver, _log) = RecordingDriver::new();
        let driver = driver.with_state_support(false);
        let sink = Arc::new(VecSink::new());
        let mut config = ReplayConfig::default();
        config.dump_state_at = Some(1);
        let mut p = pipeline_with(driver, config, sink);
        assert_eq!(
            p.retrace_call(&Call::new(1, 0, CallOp::Present)),
            CallControl::Continue
        );
        assert!(!p.stopped_at_dump);
    }

    #[test]
    fn dump_gate_fires_at_or_past_threshold() {
        let (driver, _log) = RecordingDriver::new();
        let sink = Arc::new(VecSink::new());
        let mut config = ReplayConfig::default();
        config.dump_state_at = Some(5);
        let mut p = pipeline_with(driver, config, Arc::clone(&sink));
        assert_eq!(
            p.retrace_call(&Call::new(4, 0, CallOp::Present)),
            CallControl::Continue
        );
        // Sparse trace: first call past the threshold fires the gate.
        assert_eq!(
            p.retrace_call(&Call::new(7, 0, CallOp::Present)),
            CallControl::Stop
        );
        assert!(p.stopped_at_dump);
        assert!(sink.text().contains("\"driver\""));
    }

    #[test]
    fn pre_swap_snapshot_uses_previous_call_number() {
        let (driver, _log) = RecordingDriver::new();
        let sink = Arc::new(VecSink::new());
        let mut config = ReplayConfig::default();
        config.verbosity = -2;
        config.snapshot_prefix = Some("-".to_string());
        // Every call.
        config.snapshot_frequency = "-".parse::<CallSet>().unwrap();
        let mut p = pipeline_with(driver, config, Arc::clone(&sink));

        // Target swap without END_FRAME: filed under the previous call.
        p.retrace_call(&Call::new(4, 0, CallOp::BindTarget { target: 1 }));
        let pnm = sink.take();
        assert!(pnm.starts_with(b"P6\n#3\n"));

        // Frame-ending swap: filed under its own number.
        p.retrace_call(&Call::new(5, 0, CallOp::Present));
        let pnm = sink.take();
        assert!(pnm.starts_with(b"P6\n#5\n"));

        // Ordinary call: snapshot after dispatch, own number.
        p.retrace_call(&Call::new(6, 0, CallOp::FrameEnd));
        let pnm = sink.take();
        assert!(pnm.starts_with(b"P6\n#6\n"));
    }
}
