//! Recorded call model and trace container.
//!
//! A trace is a linearised stream of [`Call`] records: every graphics API
//! invocation the traced application made, in source order, tagged with the
//! thread that made it. The replayer consumes the stream strictly in order
//! through the [`CallSource`] trait; the scheduler's baton discipline
//! guarantees the single-consumer property the sources rely on.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`format`] | Wire format: magic/version header, varints, opcodes |
//! | [`parser`] | [`TraceReader`]: streaming decoder over a zlib body |
//! | [`writer`] | [`TraceWriter`]: streaming encoder (tests, `gen_trace`) |
//!
//! Call numbers are not stored in the container; the parser assigns them,
//! strictly increasing from 1. Flags are derived from the operation in
//! [`CallOp::flags`], so the container stays free of redundant state.

pub mod format;
pub mod parser;
pub mod writer;

pub use parser::{TraceOpenError, TraceReader};
pub use writer::TraceWriter;

use std::collections::VecDeque;
use std::fmt;

// ============================================================================
// Call flags
// ============================================================================

/// Behavioral flags of a recorded call.
///
/// Derived from the operation, never stored in the container. The replay
/// pipeline keys its snapshot and frame accounting off these bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CallFlags(u8);

impl CallFlags {
    /// No flags set.
    pub const NONE: CallFlags = CallFlags(0);
    /// The call draws pixels (a "draw call" for callset and profiling
    /// purposes).
    pub const RENDER: CallFlags = CallFlags(1 << 0);
    /// The call changes the visible render target (buffer swap, target
    /// rebind). Snapshots for such calls are taken before dispatch.
    pub const SWAP_RENDERTARGET: CallFlags = CallFlags(1 << 1);
    /// The call concludes a frame.
    pub const END_FRAME: CallFlags = CallFlags(1 << 2);
    /// The call has no effect on driver state (annotations, markers).
    pub const NO_SIDE_EFFECTS: CallFlags = CallFlags(1 << 3);

    /// Returns true if every bit in `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: CallFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two flag sets.
    #[inline]
    pub const fn union(self, other: CallFlags) -> CallFlags {
        CallFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for CallFlags {
    type Output = CallFlags;

    #[inline]
    fn bitor(self, rhs: CallFlags) -> CallFlags {
        self.union(rhs)
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        let mut emit = |name: &str, f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(name)
        };
        if self.contains(CallFlags::RENDER) {
            emit("RENDER", f)?;
        }
        if self.contains(CallFlags::SWAP_RENDERTARGET) {
            emit("SWAP_RENDERTARGET", f)?;
        }
        if self.contains(CallFlags::END_FRAME) {
            emit("END_FRAME", f)?;
        }
        if self.contains(CallFlags::NO_SIDE_EFFECTS) {
            emit("NO_SIDE_EFFECTS", f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Call operations
// ============================================================================

/// The replayable operation payload of a [`Call`].
///
/// This is the API surface the drivers understand. It is deliberately small
/// but covers every flag combination the replay pipeline distinguishes:
/// draws, frame ends with and without a target swap, target swaps without a
/// frame end, and side-effect-free markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOp {
    /// Fill the bound render target with a solid color.
    Clear { color: [u8; 4] },
    /// Fill an axis-aligned rectangle on the bound render target.
    FillRect {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        color: [u8; 4],
    },
    /// Present the default render target: the visible image changes and the
    /// frame is over.
    Present,
    /// Bind a different render target. Changes the visible content without
    /// ending the frame.
    BindTarget { target: u32 },
    /// Frame boundary marker without a buffer swap (offscreen frames).
    FrameEnd,
    /// Resize the bound render target.
    Viewport { width: u32, height: u32 },
    /// Free-form annotation. No driver state is touched.
    Marker { text: String },
}

impl CallOp {
    /// Stable lowercase name, used in logs and profile rows.
    pub fn name(&self) -> &'static str {
        match self {
            CallOp::Clear { .. } => "clear",
            CallOp::FillRect { .. } => "fill_rect",
            CallOp::Present => "present",
            CallOp::BindTarget { .. } => "bind_target",
            CallOp::FrameEnd => "frame_end",
            CallOp::Viewport { .. } => "viewport",
            CallOp::Marker { .. } => "marker",
        }
    }

    /// Behavioral flags for this operation.
    ///
    /// The single derivation point: parser, tests, and synthetic sources all
    /// go through here so a given operation always carries the same flags.
    pub fn flags(&self) -> CallFlags {
        match self {
            CallOp::Clear { .. } | CallOp::FillRect { .. } => CallFlags::RENDER,
            CallOp::Present => CallFlags::SWAP_RENDERTARGET | CallFlags::END_FRAME,
            CallOp::BindTarget { .. } => CallFlags::SWAP_RENDERTARGET,
            CallOp::FrameEnd => CallFlags::END_FRAME,
            CallOp::Viewport { .. } => CallFlags::NONE,
            CallOp::Marker { .. } => CallFlags::NO_SIDE_EFFECTS,
        }
    }
}

// ============================================================================
// Call
// ============================================================================

/// One recorded API invocation.
///
/// `no` is strictly increasing across the trace and unique; `thread_id` is
/// the small integer id of the recorded thread that made the call. A call is
/// owned by whichever worker currently holds it and is dropped after
/// dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Call index, assigned by the parser starting at 1.
    pub no: u32,
    /// Recorded thread id (the scheduler leg that must replay this call).
    pub thread_id: u32,
    /// Flags derived from `op`.
    pub flags: CallFlags,
    /// The operation to dispatch.
    pub op: CallOp,
}

impl Call {
    /// Builds a call with flags derived from the operation.
    pub fn new(no: u32, thread_id: u32, op: CallOp) -> Call {
        Call {
            no,
            thread_id,
            flags: op.flags(),
            op,
        }
    }

    /// True for draw calls (`RENDER` flag).
    #[inline]
    pub fn is_draw(&self) -> bool {
        self.flags.contains(CallFlags::RENDER)
    }

    /// True for calls that conclude a frame.
    #[inline]
    pub fn ends_frame(&self) -> bool {
        self.flags.contains(CallFlags::END_FRAME)
    }

    /// True for calls that change the visible render target.
    #[inline]
    pub fn swaps_render_target(&self) -> bool {
        self.flags.contains(CallFlags::SWAP_RENDERTARGET)
    }
}

// ============================================================================
// Call sources
// ============================================================================

/// Lazy, single-consumer stream of calls in source order.
///
/// # Contract
///
/// - Calls arrive with strictly increasing `no`.
/// - Only one thread reads the source at a time. The scheduler's baton
///   discipline enforces this without the source needing interior locking;
///   `Send` is required so the source can move between worker threads.
/// - Unrecoverable parse errors are reported by the source itself and then
///   surface as end-of-stream, which terminates replay normally.
pub trait CallSource: Send {
    /// Returns the next call, or `None` at end-of-stream.
    ///
    /// May block on I/O; only the currently active worker calls this.
    fn next_call(&mut self) -> Option<Call>;
}

/// In-memory call source for tests and benchmarks.
pub struct VecSource {
    calls: VecDeque<Call>,
}

impl VecSource {
    /// Wraps an explicit call list. Callers are responsible for strictly
    /// increasing `no` values.
    pub fn new(calls: Vec<Call>) -> VecSource {
        VecSource {
            calls: calls.into(),
        }
    }

    /// Builds a source from `(thread_id, op)` pairs, numbering calls from 1.
    pub fn from_ops(ops: Vec<(u32, CallOp)>) -> VecSource {
        let calls = ops
            .into_iter()
            .zip(1u32..)
            .map(|((thread_id, op), no)| Call::new(no, thread_id, op))
            .collect();
        VecSource { calls }
    }

    /// Number of calls remaining.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// True when no calls remain.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl CallSource for VecSource {
    fn next_call(&mut self) -> Option<Call> {
        self.calls.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_derived_from_op() {
        assert_eq!(
            CallOp::Present.flags(),
            CallFlags::SWAP_RENDERTARGET | CallFlags::END_FRAME
        );
        assert_eq!(CallOp::FrameEnd.flags(), CallFlags::END_FRAME);
        assert_eq!(
            CallOp::BindTarget { target: 1 }.flags(),
            CallFlags::SWAP_RENDERTARGET
        );
        assert!(CallOp::Clear { color: [0; 4] }.flags().contains(CallFlags::RENDER));
        assert!(CallOp::Viewport {
            width: 1,
            height: 1
        }
        .flags()
        .is_empty());
    }

    #[test]
    fn flag_set_operations() {
        let f = CallFlags::RENDER | CallFlags::END_FRAME;
        assert!(f.contains(CallFlags::RENDER));
        assert!(f.contains(CallFlags::END_FRAME));
        assert!(!f.contains(CallFlags::SWAP_RENDERTARGET));
        assert!(!f.contains(CallFlags::RENDER | CallFlags::SWAP_RENDERTARGET));
        assert_eq!(format!("{:?}", f), "RENDER|END_FRAME");
        assert_eq!(format!("{:?}", CallFlags::NONE), "NONE");
    }

    #[test]
    fn vec_source_numbers_from_one() {
        let mut src = VecSource::from_ops(vec![
            (0, CallOp::Clear { color: [0; 4] }),
            (1, CallOp::Present),
        ]);
        let a = src.next_call().unwrap();
        let b = src.next_call().unwrap();
        assert_eq!((a.no, a.thread_id), (1, 0));
        assert_eq!((b.no, b.thread_id), (2, 1));
        assert!(b.ends_frame() && b.swaps_render_target());
        assert!(src.next_call().is_none());
    }
}
