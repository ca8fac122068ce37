//! Replay recorded graphics call traces against a pluggable driver.
//!
//! A trace is a linear stream of recorded API calls, each tagged with the
//! thread that originally made it. Replaying one means dispatching every
//! call to a driver in stream order while keeping each recorded thread's
//! calls on a stable OS thread — graphics backends keep per-thread state,
//! so thread identity is part of the recording. The scheduler does this
//! with a baton-passing discipline: exactly one worker runs at a time, and
//! possession of the next parsed call is what hands control over.
//!
//! Around the scheduler sit the optional per-call services: framebuffer
//! snapshots to PNG files or PNM-on-stdout, comparison against reference
//! images, timing and pixels-drawn profiling, and a one-shot driver state
//! dump at a chosen call index.
//!
//! # Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`trace`] | Call model, trace container parser/writer, call sources |
//! | [`callset`] | Call-index predicates (`frame`, `draw`, index ranges) |
//! | [`driver`] | Backend seam: trait, software rasterizer, recording stub |
//! | [`replay`] | Per-call pipeline + baton-passing scheduler |
//! | [`image`] | RGBA8 images: PNG read/write, PNM write, compare |
//! | [`output`] | Output sinks (stdout / vec / null) |
//! | [`profile`] | Per-call profiling rows |
//!
//! # Usage
//!
//! ```no_run
//! use retrace_rs::driver::SoftDriver;
//! use retrace_rs::output::StdoutSink;
//! use retrace_rs::replay::{replay, ReplayConfig};
//! use retrace_rs::trace::TraceReader;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let source = TraceReader::open(Path::new("app.rtrc")).unwrap();
//! let report = replay(
//!     Box::new(source),
//!     Box::new(SoftDriver::new()),
//!     Arc::new(StdoutSink::new()),
//!     ReplayConfig::default(),
//! );
//! println!("{} frames", report.stats.frames);
//! ```
//!
//! # Concurrency model
//!
//! Replay is strictly serial: at most one worker executes inside the
//! driver, the source, or the snapshot stage at any instant. Worker
//! threads exist solely to preserve recorded thread identity, and every
//! thread started during a run is joined before `replay` returns.

pub mod callset;
pub mod driver;
pub mod image;
pub mod output;
pub mod profile;
pub mod replay;
pub mod trace;

// Core replay surface
pub use replay::{replay, ReplayConfig, ReplayOutcome, ReplayReport, ReplayStats};
pub use trace::{
    Call, CallFlags, CallOp, CallSource, TraceOpenError, TraceReader, TraceWriter, VecSource,
};

// Supporting types
pub use callset::{CallSet, CallSetParseError};
pub use driver::{Driver, DriverError, DriverOptions, RecordingDriver, RecordingLog, SoftDriver};
pub use image::Image;
pub use output::{NullSink, OutputSink, StdoutSink, VecSink};
pub use profile::{ProfileOptions, Profiler};
