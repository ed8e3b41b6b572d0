use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::QueueClosed;

// ---------------------------------------------------------------------------
// Bounded double-ended queue of positions awaiting decode
// ---------------------------------------------------------------------------

struct QueueState {
    items: VecDeque<usize>,
    closed: bool,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Priority insert. Blocks while the queue is full.
    pub fn put_front(&self, idx: usize) -> Result<(), QueueClosed> {
        self.put(idx, true)
    }

    /// Prefetch insert. Blocks while the queue is full.
    pub fn put_back(&self, idx: usize) -> Result<(), QueueClosed> {
        self.put(idx, false)
    }

    fn put(&self, idx: usize, front: bool) -> Result<(), QueueClosed> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if state.items.len() < self.capacity {
                break;
            }
            state = self.not_full.wait(state).unwrap();
        }

        if front {
            state.items.push_front(idx);
        } else {
            state.items.push_back(idx);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until a position is available. Returns `None` once closed.
    pub fn take(&self) -> Option<usize> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return None;
            }
            if let Some(idx) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(idx);
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Wakes every blocked producer and consumer; pending items are dropped.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.items.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<usize> {
        self.state.lock().unwrap().items.iter().copied().collect()
    }
}
