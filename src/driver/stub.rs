//! Recording driver stub.
//!
//! Lets scheduler and pipeline tests observe exactly what reached the
//! backend: every dispatch and flush is appended to a shared event log,
//! stamped with the OS thread it ran on, so tests can assert the ordering
//! and thread-identity invariants directly. Knobs control snapshot
//! availability, state-dump support, and injected dispatch failures.

use super::{Driver, DriverError};
use crate::image::Image;
use crate::trace::Call;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

/// One observed driver interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    /// `execute` ran for this call on this OS thread.
    Execute {
        no: u32,
        thread_id: u32,
        os_thread: ThreadId,
        name: &'static str,
    },
    /// `flush` ran on this OS thread.
    Flush { os_thread: ThreadId },
    /// `snapshot` was requested.
    Snapshot { os_thread: ThreadId },
    /// `state` was requested for a dump.
    StateDump,
}

/// Shared handle onto a [`RecordingDriver`]'s event log.
///
/// The driver itself moves into the replay; tests keep the log.
#[derive(Clone)]
pub struct RecordingLog {
    events: Arc<Mutex<Vec<DriverEvent>>>,
}

impl RecordingLog {
    /// All events in observation order.
    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().expect("recording log poisoned").clone()
    }

    /// Call numbers of dispatched calls, in dispatch order.
    pub fn executed_nos(&self) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                DriverEvent::Execute { no, .. } => Some(*no),
                _ => None,
            })
            .collect()
    }

    /// `(no, recorded thread, OS thread)` per dispatched call.
    pub fn executions(&self) -> Vec<(u32, u32, ThreadId)> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                DriverEvent::Execute {
                    no,
                    thread_id,
                    os_thread,
                    ..
                } => Some((*no, *thread_id, *os_thread)),
                _ => None,
            })
            .collect()
    }
}

/// Instrumented backend for tests.
pub struct RecordingDriver {
    events: Arc<Mutex<Vec<DriverEvent>>>,
    snapshot: Option<Image>,
    support_state: bool,
    fail_calls: Vec<u32>,
}

impl RecordingDriver {
    /// A recording driver with a 16x16 snapshot image and state-dump
    /// support, plus the log handle to observe it with.
    pub fn new() -> (RecordingDriver, RecordingLog) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = RecordingLog {
            events: Arc::clone(&events),
        };
        (
            RecordingDriver {
                events,
                snapshot: Some(Image::solid(16, 16, [0, 0, 0, 255])),
                support_state: true,
                fail_calls: Vec::new(),
            },
            log,
        )
    }

    /// Overrides the image returned by `snapshot` (`None` = capture fails).
    pub fn with_snapshot(mut self, snapshot: Option<Image>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Enables or disables state-dump support.
    pub fn with_state_support(mut self, support: bool) -> Self {
        self.support_state = support;
        self
    }

    /// Makes `execute` fail for the given call numbers.
    pub fn failing_calls(mut self, nos: &[u32]) -> Self {
        self.fail_calls = nos.to_vec();
        self
    }

    fn record(&self, event: DriverEvent) {
        self.events
            .lock()
            .expect("recording log poisoned")
            .push(event);
    }
}

impl Driver for RecordingDriver {
    fn execute(&mut self, call: &Call) -> Result<(), DriverError> {
        self.record(DriverEvent::Execute {
            no: call.no,
            thread_id: call.thread_id,
            os_thread: thread::current().id(),
            name: call.op.name(),
        });
        if self.fail_calls.contains(&call.no) {
            return Err(DriverError::Invalid {
                detail: format!("injected failure at call {}", call.no),
            });
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.record(DriverEvent::Flush {
            os_thread: thread::current().id(),
        });
    }

    fn snapshot(&mut self) -> Option<Image> {
        self.record(DriverEvent::Snapshot {
            os_thread: thread::current().id(),
        });
        self.snapshot.clone()
    }

    fn state(&self) -> Option<serde_json::Value> {
        if !self.support_state {
            return None;
        }
        self.record(DriverEvent::StateDump);
        let executed = self
            .events
            .lock()
            .expect("recording log poisoned")
            .iter()
            .filter(|e| matches!(e, DriverEvent::Execute { .. }))
            .count();
        Some(serde_json::json!({
            "driver": "recording",
            "calls_executed": executed,
        }))
    }
}
