//! Content-addressed, FIFO-replacement cache storage (spec.md §3, §4.2).
//!
//! Grounded on the original lab's `CashMemoryStorage`: no index field, no
//! set-associativity — a line is found (or not) by a linear scan over the
//! occupied entries, tagged by its line-base byte address. Replacement is
//! a single shared FIFO queue: the next victim is whichever entry was
//! filled longest ago, full stop.

use std::collections::VecDeque;

use crate::params::LINE_SIZE_WORDS;

#[derive(Debug, Clone, Copy)]
struct CacheLine {
    occupied: bool,
    dirty: bool,
    tag: u32,
    data: [u32; LINE_SIZE_WORDS],
}

impl CacheLine {
    const EMPTY: Self = Self {
        occupied: false,
        dirty: false,
        tag: 0,
        data: [0; LINE_SIZE_WORDS],
    };
}

/// A single I-cache or D-cache, holding `capacity` lines of
/// `LINE_SIZE_WORDS` words apiece.
pub struct CacheStorage {
    lines: Vec<CacheLine>,
    /// Occupied slot indices, oldest-filled first. The front is always the
    /// next eviction victim once the cache is full.
    fifo: VecDeque<usize>,
    capacity: usize,
}

impl CacheStorage {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: vec![CacheLine::EMPTY; capacity],
            fifo: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn find(&self, tag: u32) -> Option<usize> {
        self.lines.iter().position(|l| l.occupied && l.tag == tag)
    }

    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.find(tag).is_some()
    }

    /// Read a word from a line already known to be resident.
    #[must_use]
    pub fn lookup(&self, tag: u32, offset: usize) -> Option<u32> {
        self.find(tag).map(|idx| self.lines[idx].data[offset])
    }

    /// Overwrite a word in a line already known to be resident, marking it
    /// dirty. Returns `false` if `tag` isn't cached (the caller's bug, not
    /// this store's: callers are expected to have filled the line first).
    pub fn write_word(&mut self, tag: u32, offset: usize, value: u32) -> bool {
        match self.find(tag) {
            Some(idx) => {
                self.lines[idx].data[offset] = value;
                self.lines[idx].dirty = true;
                true
            }
            None => false,
        }
    }

    /// Insert a freshly-fetched line tagged `tag`. If the cache is full,
    /// evicts the oldest-filled line first, per FIFO order; when the
    /// evicted line was dirty, its `(tag, data)` is returned so the caller
    /// can write it back to main memory before the overwrite takes effect.
    pub fn fill(&mut self, tag: u32, data: [u32; LINE_SIZE_WORDS]) -> Option<(u32, [u32; LINE_SIZE_WORDS])> {
        let (idx, evicted) = if self.fifo.len() < self.capacity {
            (self.fifo.len(), None)
        } else {
            let victim = self.fifo.pop_front().expect("fifo full implies nonempty");
            let evicted = self.lines[victim]
                .dirty
                .then(|| (self.lines[victim].tag, self.lines[victim].data));
            (victim, evicted)
        };
        self.lines[idx] = CacheLine {
            occupied: true,
            dirty: false,
            tag,
            data,
        };
        self.fifo.push_back(idx);
        evicted
    }
}
