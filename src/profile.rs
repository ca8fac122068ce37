//! Per-call replay profiling.
//!
//! Rows are buffered during replay (the hot path only stamps an `Instant`
//! and pushes a record) and emitted through the sink after the run, so
//! profiling output never interleaves with snapshot output.
//!
//! # Report format
//!
//! ```text
//! # profile call <no> <thread> <dur_ns> <pixels> <name>
//! call 1 0 5320 - clear
//! call 2 0 81240 4096 fill_rect
//! frame 1 102400
//! ```
//!
//! `call` rows are selected by mode: CPU profiling reports every call, GPU
//! and pixels-drawn profiling report draw calls only. The pixels column is
//! `-` when the driver exposes no counter or the call drew nothing.

use crate::output::OutputSink;
use crate::trace::Call;
use std::time::{Duration, Instant};

/// Which profiling modes are enabled (`-pcpu`, `-pgpu`, `-ppd`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Time every call.
    pub cpu: bool,
    /// Time draw calls (time spent inside the driver).
    pub gpu: bool,
    /// Record pixels drawn per draw call.
    pub pixels: bool,
}

impl ProfileOptions {
    /// True when any mode is enabled.
    pub fn any(&self) -> bool {
        self.cpu || self.gpu || self.pixels
    }
}

struct CallRow {
    no: u32,
    thread_id: u32,
    dur: Duration,
    pixels: Option<u64>,
    name: &'static str,
    draw: bool,
}

struct FrameRow {
    frame_no: u32,
    elapsed: Duration,
}

/// Buffers timing rows during replay, emits them afterwards.
pub struct Profiler {
    opts: ProfileOptions,
    epoch: Instant,
    calls: Vec<CallRow>,
    frames: Vec<FrameRow>,
}

impl Profiler {
    pub fn new(opts: ProfileOptions) -> Profiler {
        Profiler {
            opts,
            epoch: Instant::now(),
            calls: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// True when the pipeline should stamp timings at all.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.opts.any()
    }

    /// Records one dispatched call.
    ///
    /// `pixels` is the driver's pixels-drawn delta across the dispatch, if
    /// the driver exposes a counter.
    pub fn record_call(&mut self, call: &Call, dur: Duration, pixels: Option<u64>) {
        if !self.enabled() {
            return;
        }
        self.calls.push(CallRow {
            no: call.no,
            thread_id: call.thread_id,
            dur,
            pixels,
            name: call.op.name(),
            draw: call.is_draw(),
        });
    }

    /// Records a frame boundary.
    pub fn record_frame(&mut self, frame_no: u32) {
        if !self.enabled() {
            return;
        }
        self.frames.push(FrameRow {
            frame_no,
            elapsed: self.epoch.elapsed(),
        });
    }

    /// Emits the buffered report.
    pub fn write_report(&self, sink: &dyn OutputSink) {
        if !self.enabled() {
            return;
        }
        sink.write_line("# profile call <no> <thread> <dur_ns> <pixels> <name>");
        for row in &self.calls {
            if self.opts.cpu || (row.draw && (self.opts.gpu || self.opts.pixels)) {
                let pixels = match (self.opts.pixels, row.pixels) {
                    (true, Some(px)) => px.to_string(),
                    _ => "-".to_string(),
                };
                sink.write_line(&format!(
                    "call {} {} {} {} {}",
                    row.no,
                    row.thread_id,
                    row.dur.as_nanos(),
                    pixels,
                    row.name
                ));
            }
        }
        for frame in &self.frames {
            sink.write_line(&format!(
                "frame {} {}",
                frame.frame_no,
                frame.elapsed.as_nanos()
            ));
        }
    }
}
