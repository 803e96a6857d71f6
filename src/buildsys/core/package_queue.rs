use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::core::Package;
use std::sync::Arc;

/// Single-producer/multi-consumer work queue for the discovery phase.
///
/// `pop` never blocks: a `None` means "drained right now", not "finished";
/// workers still in flight may push more. Discovery is over only when the
/// queue is empty *and* the in-flight counter is zero.
#[derive(Default)]
pub struct PackageQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Arc<Package>>,
    in_flight: usize,
}

impl PackageQueue {
    pub fn new() -> PackageQueue {
        PackageQueue::default()
    }

    pub fn push(&self, pkg: Arc<Package>) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(pkg);
        self.cond.notify_all();
    }

    pub fn pop(&self) -> Option<Arc<Package>> {
        let mut state = self.state.lock().unwrap();
        state.queue.pop_front()
    }

    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight += 1;
    }

    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        self.cond.notify_all();
    }

    /// Block until new work arrives or the in-flight counter drops to zero.
    /// Returns immediately when work is already queued.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while state.queue.is_empty() && state.in_flight > 0 {
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Block while `limit` or more workers are in flight. Used to bound
    /// discovery parallelism by the same thread limit as execution.
    pub fn wait_below(&self, limit: usize) {
        let mut state = self.state.lock().unwrap();
        while state.in_flight >= limit {
            state = self.cond.wait(state).unwrap();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    pub fn done(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.queue.is_empty() && state.in_flight == 0
    }
}
