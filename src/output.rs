//! Replay output sinks.
//!
//! Everything the replayer prints on behalf of a trace — `Read`/`Wrote`
//! lines, compare results, PNM snapshot bytes, state-dump JSON, profile
//! rows — goes through an [`OutputSink`] rather than `println!`. The CLI
//! wires up [`StdoutSink`]; tests capture with [`VecSink`]; benches discard
//! with [`NullSink`].
//!
//! The baton discipline means at most one worker writes at a time, but the
//! sink still serializes with a mutex: the lead thread also writes summary
//! output after workers are done, and a sink must not depend on scheduler
//! internals for its safety.
//!
//! # Panic policy
//!
//! Sinks panic on I/O errors (fail-fast), except `BrokenPipe` on stdout,
//! which is silently ignored (`replayer trace | head` must not abort).

use std::io::{self, BufWriter, ErrorKind, Write};
use std::sync::Mutex;

/// Byte-oriented output destination shared across workers.
pub trait OutputSink: Send + Sync + 'static {
    /// Writes a batch of bytes. Batches never interleave at byte level.
    fn write_all(&self, bytes: &[u8]);

    /// Flushes buffered data to the OS. Call after replay quiesces.
    fn flush(&self);

    /// Convenience: writes one text line.
    fn write_line(&self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write_all(&buf);
    }
}

/// Buffered stdout sink.
pub struct StdoutSink {
    out: Mutex<BufWriter<io::Stdout>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(BufWriter::new(io::stdout())),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn write_all(&self, bytes: &[u8]) {
        let mut out = self.out.lock().expect("stdout sink mutex poisoned");
        if let Err(e) = out.write_all(bytes) {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("stdout write failed: {e}");
        }
    }

    fn flush(&self) {
        let mut out = self.out.lock().expect("stdout sink mutex poisoned");
        if let Err(e) = out.flush() {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("stdout flush failed: {e}");
        }
    }
}

/// Test sink: captures all bytes in memory.
pub struct VecSink {
    buf: Mutex<Vec<u8>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(Vec::new()),
        }
    }

    /// Extracts captured bytes, leaving the sink empty.
    pub fn take(&self) -> Vec<u8> {
        let mut g = self.buf.lock().expect("vec sink mutex poisoned");
        std::mem::take(&mut *g)
    }

    /// Captured bytes decoded as UTF-8 (lossy), without draining.
    pub fn text(&self) -> String {
        let g = self.buf.lock().expect("vec sink mutex poisoned");
        String::from_utf8_lossy(&g).into_owned()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().expect("vec sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for VecSink {
    fn write_all(&self, bytes: &[u8]) {
        self.buf
            .lock()
            .expect("vec sink mutex poisoned")
            .extend_from_slice(bytes);
    }

    fn flush(&self) {}
}

/// Discards all output. For benchmarks.
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_all(&self, _bytes: &[u8]) {}

    fn flush(&self) {}
}
