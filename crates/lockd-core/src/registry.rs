// Named lock registry
// Maps each configured lock name to a bounded slot set; immutable after start-up

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{LockError, RegistryError};
use crate::model::{LockDefinition, LockStatus};

/// Bounded counting semaphore backing one lock name
///
/// Tracks occupancy only: `release()` returns one slot no matter which
/// `acquire()` it logically undoes.
pub struct SlotSet {
    name: String,
    capacity: usize,
    semaphore: Semaphore,
    waiters: AtomicUsize,
}

impl SlotSet {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            semaphore: Semaphore::new(capacity),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently taken
    pub fn holders(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Callers currently suspended in `acquire()`
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Wait until a slot is free, then take it
    ///
    /// There is no timeout. Dropping the returned future before it completes
    /// takes no slot.
    pub async fn acquire(&self) -> Result<(), LockError> {
        let _waiting = WaitingGuard::enter(self);

        match self.semaphore.acquire().await {
            Ok(permit) => {
                permit.forget();
                counter!("lockd_lock_acquired_total", "lock" => self.name.clone()).increment(1);
                Ok(())
            }
            Err(_) => Err(LockError::Closed(self.name.clone())),
        }
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                counter!("lockd_lock_acquired_total", "lock" => self.name.clone()).increment(1);
                true
            }
            Err(_) => false,
        }
    }

    /// Return one slot, waking one waiter if any
    ///
    /// Callers must only release what they acquired; the count is not checked.
    pub fn release(&self) {
        self.semaphore.add_permits(1);
        counter!("lockd_lock_released_total", "lock" => self.name.clone()).increment(1);
    }

    /// Wake every waiter with `LockError::Closed` and refuse further acquires
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn status(&self) -> LockStatus {
        LockStatus {
            name: self.name.clone(),
            capacity: self.capacity,
            holders: self.holders(),
            waiters: self.waiters(),
        }
    }
}

impl std::fmt::Debug for SlotSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotSet")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("waiters", &self.waiters())
            .finish()
    }
}

// Counts a caller as waiting for as long as its acquire future is alive.
struct WaitingGuard<'a> {
    slots: &'a SlotSet,
}

impl<'a> WaitingGuard<'a> {
    fn enter(slots: &'a SlotSet) -> Self {
        let waiting = slots.waiters.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("lockd_lock_waiters", "lock" => slots.name.clone()).set(waiting as f64);
        Self { slots }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let waiting = self.slots.waiters.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("lockd_lock_waiters", "lock" => self.slots.name.clone()).set(waiting as f64);
    }
}

/// Immutable mapping from lock name to slot set
///
/// Built once from configuration; lookups need no synchronization.
#[derive(Debug, Default)]
pub struct LockRegistry {
    slots: HashMap<String, Arc<SlotSet>>,
}

impl LockRegistry {
    /// Build the registry, rejecting empty names, zero capacities and duplicates
    pub fn new(definitions: &[LockDefinition]) -> Result<Self, RegistryError> {
        let mut slots = HashMap::with_capacity(definitions.len());

        for def in definitions {
            if def.name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if def.capacity == 0 {
                return Err(RegistryError::ZeroCapacity(def.name.clone()));
            }
            if def.capacity > Semaphore::MAX_PERMITS {
                return Err(RegistryError::CapacityTooLarge(
                    def.name.clone(),
                    def.capacity,
                ));
            }

            match slots.entry(def.name.clone()) {
                Entry::Occupied(_) => return Err(RegistryError::DuplicateName(def.name.clone())),
                Entry::Vacant(entry) => {
                    debug!(lock = %def.name, capacity = def.capacity, "Registered lock");
                    entry.insert(Arc::new(SlotSet::new(def.name.clone(), def.capacity)));
                }
            }
        }

        info!(locks = slots.len(), "Lock registry initialized");

        Ok(Self { slots })
    }

    /// Slot set for `name`, or `None` if the name is not configured
    pub fn lookup(&self, name: &str) -> Option<Arc<SlotSet>> {
        self.slots.get(name).cloned()
    }

    /// Like `lookup`, but an unknown name is an error
    pub fn get(&self, name: &str) -> Result<Arc<SlotSet>, LockError> {
        self.lookup(name)
            .ok_or_else(|| LockError::UnknownLock(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured lock names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Status of every slot set, sorted by name
    pub fn snapshot(&self) -> Vec<LockStatus> {
        let mut statuses: Vec<LockStatus> = self.slots.values().map(|s| s.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Close every slot set so that pending waiters wake up
    pub fn close_all(&self) {
        for slots in self.slots.values() {
            slots.close();
        }
    }
}
