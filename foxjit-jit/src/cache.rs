use crate::{CacheEntry, NativeBackend};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

/// Guest-memory-page granularity the cache places watches at (spec §4.D/§6).
pub const PAGE_SIZE: u32 = 4096;

/// The guest memory subsystem's half of the watch protocol (spec §4.E): the
/// cache calls `add_watch`/`remove_watch` as a page's live-entry refcount
/// crosses zero in either direction. Grounded on the `InterpreterStorage`
/// trait-based seam `fuel-vm/src/storage.rs` uses to keep a VM generic over
/// its host, generalized here to the narrower watch-installation surface
/// the cache actually needs.
pub trait GuestMemoryWatch: Send + Sync {
    fn add_watch(&self, page: u32);
    fn remove_watch(&self, page: u32);
}

/// A [`GuestMemoryWatch`] that does nothing, for embedders (and tests) that
/// don't need real memory watches.
#[derive(Debug, Default)]
pub struct NullWatch;

impl GuestMemoryWatch for NullWatch {
    fn add_watch(&self, _page: u32) {}
    fn remove_watch(&self, _page: u32) {}
}

struct CacheState {
    lookup_map: HashMap<u32, Arc<CacheEntry>>,
    trailing_map: BTreeMap<u32, Arc<CacheEntry>>,
    /// Keyed by physical end address; a `Vec` per key since identical
    /// physical code can be mapped at distinct virtual addresses (spec
    /// §4.E: "Multimap because...").
    invalidation_map: BTreeMap<u32, Vec<Arc<CacheEntry>>>,
    dirty_queue: VecDeque<Arc<CacheEntry>>,
    compile_queue: VecDeque<Arc<CacheEntry>>,
    memory_map: Vec<u32>,
}

/// Storage of collected JIT routines, keyed by guest virtual address and
/// kept consistent with writes to guest memory via a watch callback (spec
/// §4.E).
///
/// `lookup`/`trailing_unit` treat any [`CacheEntry::is_invalidated`] entry
/// as absent even before it has been physically removed from
/// `lookup_map`/`trailing_map` — matching a C++ cache implementation's
/// actual behavior (invalidation immediately removes from
/// `invalidation_map` only; the
/// other two maps are cleaned up lazily by [`garbage_collect`](Cache::garbage_collect)),
/// while still satisfying the externally observable "lookup returns null"
/// contract spec §8's testable properties require right after invalidation.
pub struct Cache {
    state: Mutex<CacheState>,
    watcher: Box<dyn GuestMemoryWatch>,
}

impl Cache {
    pub fn new(physical_address_limit: u32, watcher: Box<dyn GuestMemoryWatch>) -> Cache {
        let page_count = (physical_address_limit + PAGE_SIZE - 1) / PAGE_SIZE;
        Cache {
            state: Mutex::new(CacheState {
                lookup_map: HashMap::new(),
                trailing_map: BTreeMap::new(),
                invalidation_map: BTreeMap::new(),
                dirty_queue: VecDeque::new(),
                compile_queue: VecDeque::new(),
                memory_map: vec![0; page_count as usize],
            }),
            watcher,
        }
    }

    /// Find an entry starting exactly at `va`. No side effects; does not
    /// distinguish "never existed" from "invalidated but not GC'd yet" —
    /// both read as `None`.
    pub fn lookup(&self, va: u32) -> Option<Arc<CacheEntry>> {
        let state = self.state.lock().unwrap();
        state.lookup_map.get(&va).filter(|e| !e.is_invalidated()).cloned()
    }

    /// The start address of the next live entry strictly after `va`, or
    /// `u32::MAX` if none.
    pub fn trailing_unit(&self, va: u32) -> u32 {
        let state = self.state.lock().unwrap();
        state
            .trailing_map
            .range((Bound::Excluded(va), Bound::Unbounded))
            .find(|(_, e)| !e.is_invalidated())
            .map(|(start, _)| *start)
            .unwrap_or(u32::MAX)
    }

    /// Insert a new entry, invalidating any prior entry whose physical
    /// range it overlaps (spec §8 property 3 / Scenario D).
    pub fn insert(&self, entry: Arc<CacheEntry>) {
        let mut state = self.state.lock().unwrap();
        let phys_start = entry.physical_address();
        let phys_end = entry.end_address();
        self.invalidate_range_locked(&mut state, phys_start, phys_end);

        state.lookup_map.insert(entry.virtual_address(), entry.clone());
        state.trailing_map.insert(entry.virtual_address(), entry.clone());
        state.invalidation_map.entry(phys_end).or_default().push(entry.clone());
        self.add_pages_locked(&mut state, phys_start, phys_end);
        tracing::debug!(va = entry.virtual_address(), phys_start, phys_end, "inserted cache entry");
    }

    /// Queue `entry` for backend compilation; currently compiles inline
    /// (spec §4.E/§5: "the current reference compiles synchronously").
    pub fn queue_compile_unit(&self, entry: Arc<CacheEntry>, backend: &dyn NativeBackend) {
        if entry.is_queued() {
            return;
        }
        entry.set_is_queued(true);
        {
            let mut state = self.state.lock().unwrap();
            state.compile_queue.push_back(entry);
        }
        self.run_compilation(backend);
    }

    fn run_compilation(&self, backend: &dyn NativeBackend) {
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                state.compile_queue.pop_front()
            };
            let Some(entry) = next else { break };
            let compiled = entry.compile(backend);
            entry.set_is_queued(false);
            if !compiled {
                tracing::warn!(va = entry.virtual_address(), "entry failed to compile");
            }
        }
    }

    /// Invalidate every entry whose physical range intersects
    /// `[start, start + len)` (a guest memory write callback; spec §8
    /// Scenario E). May be called from any thread.
    pub fn memory_dirtied(&self, start: u32, len: u32) {
        let mut state = self.state.lock().unwrap();
        tracing::trace!(start, len, "memory dirtied");
        self.invalidate_range_locked(&mut state, start, start + len);
    }

    /// Drain `dirty_queue`, physically removing invalidated entries from
    /// `lookup_map`/`trailing_map`. Returns whether anything was freed.
    pub fn garbage_collect(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.dirty_queue.is_empty() {
            return false;
        }
        let drained: Vec<_> = state.dirty_queue.drain(..).collect();
        for entry in drained {
            state.lookup_map.remove(&entry.virtual_address());
            state.trailing_map.remove(&entry.virtual_address());
        }
        tracing::debug!("garbage collected dirty cache entries");
        true
    }

    /// Invalidate every entry in the cache.
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock().unwrap();
        self.invalidate_range_locked(&mut state, 0, u32::MAX);
    }

    fn invalidate_range_locked(&self, state: &mut CacheState, start: u32, end: u32) {
        let keys: Vec<u32> = state.invalidation_map.range((Bound::Excluded(start), Bound::Unbounded)).map(|(k, _)| *k).collect();
        let mut stop = false;
        for key in keys {
            if stop {
                break;
            }
            let Some(entries) = state.invalidation_map.remove(&key) else { continue };
            let mut keep = Vec::new();
            for entry in entries {
                if stop || entry.physical_address() >= end {
                    stop = true;
                    keep.push(entry);
                    continue;
                }
                entry.set_is_invalidated();
                self.remove_pages_locked(state, entry.physical_address(), entry.end_address());
                state.dirty_queue.push_back(entry);
            }
            if !keep.is_empty() {
                state.invalidation_map.insert(key, keep);
            }
        }
    }

    fn add_pages_locked(&self, state: &mut CacheState, phys_start: u32, phys_end: u32) {
        for page in pages_covering(phys_start, phys_end) {
            let count = &mut state.memory_map[page as usize];
            if *count == 0 {
                self.watcher.add_watch(page);
            }
            *count += 1;
        }
    }

    fn remove_pages_locked(&self, state: &mut CacheState, phys_start: u32, phys_end: u32) {
        for page in pages_covering(phys_start, phys_end) {
            let count = &mut state.memory_map[page as usize];
            assert!(*count > 0, "page refcount underflow");
            *count -= 1;
            if *count == 0 {
                self.watcher.remove_watch(page);
            }
        }
    }

    /// Test/debug accessor for the per-page refcount of `page` (spec §8
    /// property 4).
    pub fn page_refcount(&self, page: u32) -> u32 {
        self.state.lock().unwrap().memory_map[page as usize]
    }
}

fn pages_covering(phys_start: u32, phys_end: u32) -> impl Iterator<Item = u32> {
    let from_page = phys_start / PAGE_SIZE;
    let first_page_after = phys_end.div_ceil(PAGE_SIZE);
    from_page..first_page_after
}
