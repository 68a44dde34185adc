//! Bounded, growable pool of worker slots
//!
//! A slot is the permission to run one iteration. The pool starts with
//! `pre_allocated` idle slots and creates new ones on demand until
//! `max_concurrent` exist; beyond that `try_acquire` reports exhaustion and
//! the caller drops the arrival. Slots are never destroyed during a run.
//!
//! Acquisition never waits. The internal lock is only held for the
//! bookkeeping and never across an await point.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub created: usize,
    pub busy: usize,
    pub idle: usize,
    pub peak_busy: usize,
    pub max: usize,
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<SlotState>,
    idle: Vec<usize>,
    busy: usize,
    peak_busy: usize,
}

#[derive(Debug)]
struct PoolInner {
    state: Mutex<PoolState>,
    max: usize,
}

impl PoolInner {
    fn release(&self, id: usize) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.slots.get_mut(id) {
            Some(slot) if *slot == SlotState::Busy => {
                *slot = SlotState::Idle;
                state.idle.push(id);
                state.busy -= 1;
            }
            _ => debug!("Ignoring release of slot {} that is not busy", id),
        }
    }
}

/// Cloneable handle to a shared worker pool
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// `pre_allocated` is clamped to `max_concurrent`
    pub fn new(pre_allocated: usize, max_concurrent: usize) -> Self {
        let pre_allocated = pre_allocated.min(max_concurrent);
        let state = PoolState {
            slots: vec![SlotState::Idle; pre_allocated],
            // Popped from the back, so slot 0 is handed out first
            idle: (0..pre_allocated).rev().collect(),
            busy: 0,
            peak_busy: 0,
        };

        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(state),
                max: max_concurrent,
            }),
        }
    }

    /// Take an idle slot, growing the pool if allowed
    ///
    /// Returns `None` when every slot is busy and the pool is at its maximum.
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        let mut state = self.inner.state.lock();

        let id = match state.idle.pop() {
            Some(id) => {
                state.slots[id] = SlotState::Busy;
                id
            }
            None if state.slots.len() < self.inner.max => {
                let id = state.slots.len();
                state.slots.push(SlotState::Busy);
                debug!("Grew worker pool to {} slots", state.slots.len());
                id
            }
            None => return None,
        };

        state.busy += 1;
        state.peak_busy = state.peak_busy.max(state.busy);

        Some(WorkerSlot {
            id,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Return a slot to the pool
    ///
    /// Equivalent to dropping it.
    pub fn release(&self, slot: WorkerSlot) {
        drop(slot);
    }

    pub fn slot_state(&self, id: usize) -> Option<SlotState> {
        self.inner.state.lock().slots.get(id).copied()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            created: state.slots.len(),
            busy: state.busy,
            idle: state.idle.len(),
            peak_busy: state.peak_busy,
            max: self.inner.max,
        }
    }
}

/// Exclusive use of one pool slot, released when dropped
#[derive(Debug)]
pub struct WorkerSlot {
    id: usize,
    pool: Arc<PoolInner>,
}

impl WorkerSlot {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
