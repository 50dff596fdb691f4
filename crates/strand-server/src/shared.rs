use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::state::WorkUnit;

/// State shared between the acceptor thread and the worker pool: the work
/// queue, its wakeup condvar, and the bookkeeping workers use to decide
/// whether to exit when idle.
pub struct Shared {
    pub queue: Mutex<VecDeque<WorkUnit>>,
    pub signal: Condvar,
    pub stop: AtomicBool,
    pub active_workers: AtomicUsize,
    pub min_servers: usize,
    pub requests: AtomicUsize,
    pub connections: AtomicUsize,
    pub throttles: AtomicUsize,
}

impl Shared {
    pub fn new(min_servers: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            stop: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            min_servers,
            requests: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            throttles: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, unit: WorkUnit) {
        let mut q = self.queue.lock().expect("work queue mutex poisoned");
        q.push_back(unit);
        self.signal.notify_one();
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().expect("work queue mutex poisoned").len()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.signal.notify_all();
    }
}
