//! Baton-passing replay scheduler.
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────────────────────────────────────────────┐
//!              │                      Race                          │
//!              │                                                    │
//!   caller ────┼─► Worker 0 (lead, runs on the calling thread)      │
//!   thread     │        │  ▲                                        │
//!              │  baton │  │ baton                                  │
//!              │        ▼  │                                        │
//!              │    Worker 1 ◄──► Worker N   (one OS thread each)   │
//!              │                                                    │
//!              │  Shared: Mutex<Pipeline> (source+driver+counters)  │
//!              └────────────────────────────────────────────────────┘
//! ```
//!
//! One worker per recorded thread id ("leg"), created on demand. At any
//! moment exactly one worker runs: it holds the baton — the next parsed
//! call — and with it exclusive access to the pipeline. It dispatches its
//! call and keeps pulling from the source as long as consecutive calls
//! carry its own leg; the first foreign call is flushed past the driver and
//! handed to its owner's baton slot, and the current worker parks.
//!
//! # Invariants
//!
//! - **Single baton**: at most one worker has a non-empty baton slot. The
//!   active worker is the only producer (via `pass_baton`), the receiving
//!   worker the only consumer.
//! - **Per-leg order**: calls with the same recorded thread id dispatch in
//!   strictly increasing call number — a leg's calls are consumed by one
//!   worker, in stream order.
//! - **Single consumer**: only the baton holder touches the call source,
//!   so the source needs no locking of its own.
//! - **Flush before handoff**: rendering issued by one worker completes
//!   before the next worker resumes.
//! - **Joined teardown**: every worker thread started during a run is
//!   joined before [`Race::run`] returns; worker panics are re-raised on
//!   the calling thread after teardown.
//!
//! The lead worker (leg 0) runs on the thread that started the replay and
//! owns no OS thread: backends that bind their context to the first thread
//! keep working, and traces recorded under that assumption replay
//! faithfully.

use super::pipeline::{CallControl, Pipeline};
use crate::trace::Call;
use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// Per-worker slots guarded by the worker's own mutex.
#[derive(Default)]
struct WorkerState {
    /// The in-flight call handed to this worker, if any.
    baton: Option<Call>,
    /// Set to terminate the worker's event loop.
    finished: bool,
}

/// One leg of the replay: serves a single recorded thread id.
struct Worker {
    leg: u32,
    state: Mutex<WorkerState>,
    wake: Condvar,
}

impl Worker {
    fn new(leg: u32) -> Worker {
        Worker {
            leg,
            state: Mutex::new(WorkerState::default()),
            wake: Condvar::new(),
        }
    }

    /// Hands this worker a call. Called by the previously active worker.
    fn receive(&self, call: Call) {
        debug_assert_eq!(call.thread_id, self.leg, "baton routed to wrong leg");
        let mut state = self.state.lock().expect("worker state poisoned");
        debug_assert!(state.baton.is_none(), "receiver's baton slot occupied");
        state.baton = Some(call);
        drop(state);
        self.wake.notify_one();
    }

    /// Tells this worker to exit its event loop.
    fn finish(&self) {
        let mut state = self.state.lock().expect("worker state poisoned");
        state.finished = true;
        drop(state);
        self.wake.notify_one();
    }
}

struct RaceInner {
    /// The shared pipeline; locked by the active worker for a whole leg run.
    core: Mutex<Pipeline>,
    /// The leg-0 worker. Exists for the entire replay.
    lead: Arc<Worker>,
    /// Workers indexed by leg, grown on demand by the active worker.
    workers: Mutex<Vec<Option<Arc<Worker>>>>,
    /// Join handles for non-lead workers.
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// First worker panic, re-raised after teardown.
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,
}

impl RaceInner {
    /// Records the first worker panic and unblocks the lead so teardown can
    /// proceed.
    fn record_panic(&self, payload: Box<dyn Any + Send + 'static>) {
        let mut slot = self.panic.lock().expect("panic slot poisoned");
        if slot.is_none() {
            *slot = Some(payload);
        }
        drop(slot);
        self.lead.finish();
    }
}

/// Returns the worker for `leg`, creating it (and its thread) on demand.
///
/// Called only by the currently active worker, so growth of the vector is
/// single-threaded in practice; the mutex makes that assumption checkable
/// rather than load-bearing.
fn runner(inner: &Arc<RaceInner>, leg: u32) -> Arc<Worker> {
    let mut workers = inner.workers.lock().expect("worker table poisoned");
    let idx = leg as usize;
    if idx >= workers.len() {
        workers.resize_with(idx + 1, || None);
    }
    if let Some(worker) = &workers[idx] {
        return Arc::clone(worker);
    }

    let worker = Arc::new(Worker::new(leg));
    workers[idx] = Some(Arc::clone(&worker));

    let thread_inner = Arc::clone(inner);
    let thread_worker = Arc::clone(&worker);
    let handle = thread::Builder::new()
        .name(format!("replay-leg-{leg}"))
        .spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                worker_loop(&thread_inner, &thread_worker);
            }));
            if let Err(payload) = result {
                thread_inner.record_panic(payload);
            }
        })
        .expect("failed to spawn replay worker thread");
    inner
        .handles
        .lock()
        .expect("handle table poisoned")
        .push(handle);
    worker
}

/// Routes a freshly parsed foreign call to its leg's worker.
fn pass_baton(inner: &Arc<RaceInner>, call: Call) {
    runner(inner, call.thread_id).receive(call);
}

/// Worker event loop: wait for a baton or the finish signal.
fn worker_loop(inner: &Arc<RaceInner>, me: &Worker) {
    loop {
        let call = {
            let mut state = me.state.lock().expect("worker state poisoned");
            while !state.finished && state.baton.is_none() {
                state = me.wake.wait(state).expect("worker state poisoned");
            }
            if state.finished {
                break;
            }
            state
                .baton
                .take()
                .expect("woken without baton or finish signal")
        };
        run_leg(inner, me, call);
    }
}

/// Consumes `call` and every consecutive call for this leg, then hands off
/// or winds down.
fn run_leg(inner: &Arc<RaceInner>, me: &Worker, mut call: Call) {
    let mut core = inner.core.lock().expect("replay core poisoned");
    loop {
        debug_assert_eq!(call.thread_id, me.leg, "call run on wrong leg");
        let control = core.retrace_call(&call);

        if control == CallControl::Stop {
            core.flush_rendering();
            drop(core);
            // Wind down through the lead; `stop_all` will reach this worker.
            inner.lead.finish();
            return;
        }

        match core.next_call() {
            None => {
                // End of stream: the last active worker notifies the lead,
                // which terminates the race.
                core.flush_rendering();
                drop(core);
                inner.lead.finish();
                return;
            }
            Some(next) if next.thread_id == me.leg => call = next,
            Some(next) => {
                core.flush_rendering();
                drop(core);
                pass_baton(inner, next);
                return;
            }
        }
    }
}

/// The replay scheduler. Owns the workers, the pipeline, and teardown.
pub(crate) struct Race {
    inner: Arc<RaceInner>,
}

impl Race {
    pub(crate) fn new(pipeline: Pipeline) -> Race {
        let lead = Arc::new(Worker::new(0));
        Race {
            inner: Arc::new(RaceInner {
                core: Mutex::new(pipeline),
                lead: Arc::clone(&lead),
                workers: Mutex::new(vec![Some(lead)]),
                handles: Mutex::new(Vec::new()),
                panic: Mutex::new(None),
            }),
        }
    }

    /// Runs the replay to completion on the calling thread and returns the
    /// pipeline for inspection.
    ///
    /// # Panics
    ///
    /// Re-raises the first worker panic, after every worker thread has been
    /// signalled and joined.
    pub(crate) fn run(self) -> Pipeline {
        let first = {
            let mut core = self.inner.core.lock().expect("replay core poisoned");
            core.next_call()
        };

        if let Some(first) = first {
            if first.thread_id == 0 {
                // The lead's loop has not started: place the baton directly,
                // no signaling needed.
                self.inner
                    .lead
                    .state
                    .lock()
                    .expect("worker state poisoned")
                    .baton = Some(first);
            } else {
                pass_baton(&self.inner, first);
            }

            // The lead worker runs here, on the caller's thread.
            worker_loop(&self.inner, &self.inner.lead);

            // The lead crossed the finish line: stop everyone else.
            self.stop_all();
        }

        self.join_all();

        let inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(_) => unreachable!("worker threads outlived join"),
        };
        if cfg!(debug_assertions) {
            let workers = inner.workers.lock().expect("worker table poisoned");
            for worker in workers.iter().flatten() {
                let state = worker.state.lock().expect("worker state poisoned");
                debug_assert!(
                    state.baton.is_none(),
                    "race torn down with a baton in flight"
                );
            }
        }
        inner.core.into_inner().expect("replay core poisoned")
    }

    /// Signals every non-lead worker to exit. Called by the lead after its
    /// own loop terminates, i.e. after the last baton has been consumed.
    fn stop_all(&self) {
        let workers = self.inner.workers.lock().expect("worker table poisoned");
        for worker in workers.iter().skip(1).flatten() {
            worker.finish();
        }
    }

    /// Joins every worker thread, then re-raises the first recorded panic.
    fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.handles.lock().expect("handle table poisoned");
            guard.drain(..).collect()
        };
        for handle in handles {
            // Worker bodies catch their own panics; join errors cannot carry
            // a payload we have not already recorded.
            let _ = handle.join();
        }
        let payload = self
            .inner
            .panic
            .lock()
            .expect("panic slot poisoned")
            .take();
        if let Some(payload) = payload {
            std::panic::resume_unwind(payload);
        }
    }
}
