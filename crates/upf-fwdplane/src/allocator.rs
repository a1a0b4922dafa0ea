//! Usage-counter identifier allocation.
//!
//! Each [`CounterClass`] owns an identifier space `[1, capacity)`. Free ids
//! are handed out from a high-water mark and reused LIFO once released, so
//! both operations are O(1). Every class sits behind its own mutex; a caller
//! never holds one across an await point.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{FwdError, FwdResult};
use crate::types::{CounterClass, CounterId};

/// Identifier pool for one counter class.
#[derive(Debug, Default)]
pub struct CounterPool {
    capacity: u32,
    /// Lowest id never handed out since the last configure.
    next: u32,
    /// Released ids, reused before `next` advances.
    recycled: Vec<u32>,
    allocated: HashSet<u32>,
}

impl CounterPool {
    pub fn new(capacity: u32) -> Self {
        let mut pool = Self::default();
        pool.configure(capacity);
        pool
    }

    /// Resets the pool to `[1, capacity)` with nothing allocated.
    pub fn configure(&mut self, capacity: u32) {
        self.capacity = capacity;
        self.next = 1;
        self.recycled.clear();
        self.allocated.clear();
    }

    pub fn allocate(&mut self) -> Option<CounterId> {
        let raw = match self.recycled.pop() {
            Some(raw) => raw,
            None if self.next < self.capacity => {
                let raw = self.next;
                self.next += 1;
                raw
            }
            None => return None,
        };
        self.allocated.insert(raw);
        CounterId::new(raw)
    }

    /// Returns `id` to the pool. Unknown ids are ignored.
    pub fn release(&mut self, id: CounterId) -> bool {
        if self.allocated.remove(&id.as_raw()) {
            self.recycled.push(id.as_raw());
            true
        } else {
            false
        }
    }

    pub fn is_allocated(&self, id: CounterId) -> bool {
        self.allocated.contains(&id.as_raw())
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }
}

/// Counter pools for every class.
#[derive(Debug, Default)]
pub struct CounterAllocator {
    pre_qos: Mutex<CounterPool>,
    post_qos: Mutex<CounterPool>,
}

impl CounterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, class: CounterClass) -> &Mutex<CounterPool> {
        match class {
            CounterClass::PreQos => &self.pre_qos,
            CounterClass::PostQos => &self.post_qos,
        }
    }

    /// Sets the id space of `class` to `[1, capacity)` and forgets every
    /// previous allocation.
    pub fn configure(&self, class: CounterClass, capacity: u32) {
        self.pool(class).lock().configure(capacity);
        info!(%class, capacity, "Counter pool configured");
    }

    pub fn allocate(&self, class: CounterClass) -> FwdResult<CounterId> {
        let id = self
            .pool(class)
            .lock()
            .allocate()
            .ok_or_else(|| FwdError::resource_exhausted(class))?;
        debug!(%class, counter_id = %id, "Allocated counter");
        Ok(id)
    }

    /// Idempotent; releasing an id that is not allocated is a no-op.
    pub fn release(&self, class: CounterClass, id: CounterId) {
        if self.pool(class).lock().release(id) {
            debug!(%class, counter_id = %id, "Released counter");
        }
    }

    pub fn is_allocated(&self, class: CounterClass, id: CounterId) -> bool {
        self.pool(class).lock().is_allocated(id)
    }

    pub fn capacity(&self, class: CounterClass) -> u32 {
        self.pool(class).lock().capacity()
    }

    pub fn allocated_count(&self, class: CounterClass) -> usize {
        self.pool(class).lock().allocated_count()
    }
}
