//! Driver seam: the boundary between replay and the graphics backend.
//!
//! The scheduler and pipeline never touch a backend directly; they drive a
//! [`Driver`] trait object. Two implementations ship in-repo:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`soft`] | Headless software rasterizer (the production backend) |
//! | [`stub`] | Recording stub for scheduler and pipeline tests |
//!
//! # Contract
//!
//! - `execute` applies exactly one call. Failures are *reported*, not
//!   propagated: the pipeline logs and moves on, so a driver error can never
//!   abort replay.
//! - `flush` completes any buffered rendering for the calling thread. The
//!   scheduler calls it before every baton handoff and at end-of-stream, so
//!   work performed by one worker is visible when the next resumes.
//! - `snapshot` captures the current framebuffer; `None` means capture is
//!   impossible right now (no surface yet) and the snapshot stage skips
//!   silently.
//! - `state` serializes the full driver state for `-D`; `None` means state
//!   dumping is unsupported, in which case the dump gate never fires.
//!
//! Drivers are `Send` (the baton moves the single active worker across OS
//! threads) but not `Sync`: the scheduler guarantees exclusive access.

pub mod soft;
pub mod stub;

pub use soft::SoftDriver;
pub use stub::{DriverEvent, RecordingDriver, RecordingLog};

use crate::image::Image;
use crate::trace::Call;
use std::fmt;

/// Backend configuration forwarded from the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverOptions {
    /// Use a double-buffered visual (`-db`/`-sb`).
    pub double_buffer: bool,
    /// Request a core-profile context (`-core`).
    pub core_profile: bool,
    /// Validate calls and report errors; disabled by benchmark mode (`-b`).
    pub check_errors: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            double_buffer: true,
            core_profile: false,
            check_errors: true,
        }
    }
}

/// A failed dispatch. Logged by the pipeline, never fatal.
#[derive(Debug)]
#[non_exhaustive]
pub enum DriverError {
    /// The backend does not implement this operation.
    Unsupported { name: &'static str },
    /// The call's arguments are invalid for the current state.
    Invalid { detail: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { name } => write!(f, "unsupported call {name}"),
            Self::Invalid { detail } => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for DriverError {}

/// A graphics backend able to apply recorded calls.
pub trait Driver: Send {
    /// Applies backend options. Called once before the first dispatch.
    fn configure(&mut self, _opts: &DriverOptions) {}

    /// Applies one call to the backend.
    fn execute(&mut self, call: &Call) -> Result<(), DriverError>;

    /// Completes buffered rendering for the calling thread.
    fn flush(&mut self);

    /// Captures the current framebuffer, if one exists.
    fn snapshot(&mut self) -> Option<Image>;

    /// Cumulative pixels written by draw calls, if the backend counts them.
    fn pixels_drawn(&self) -> Option<u64> {
        None
    }

    /// Serializes the full backend state, if supported.
    fn state(&self) -> Option<serde_json::Value> {
        None
    }
}
