//! Bounded, region-scoped FIFO of recently shown items.

use std::collections::VecDeque;

use crate::poi::RegionKey;

/// Default number of trailing entries kept per region.
pub const DEFAULT_TRAILING_CAPACITY: usize = 25;

/// Ordered ring of the most recent entries within one region.
///
/// Entering a different region purges the ring. Pushing past capacity evicts
/// the oldest entry. Evicted and purged entries are handed back to the caller
/// so it can release whatever resources they hold.
#[derive(Debug, Clone)]
pub struct TrailingWindow<T> {
    capacity: usize,
    region: Option<RegionKey>,
    entries: VecDeque<T>,
}

impl<T> TrailingWindow<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "trailing window capacity must be non-zero");
        Self {
            capacity,
            region: None,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn region(&self) -> Option<&RegionKey> {
        self.region.as_ref()
    }

    /// Switch to `region`, returning purged entries when it differs from the
    /// current one.
    pub fn enter_region(&mut self, region: &RegionKey) -> Vec<T> {
        if self.region.as_ref() == Some(region) {
            return Vec::new();
        }
        self.region = Some(region.clone());
        self.entries.drain(..).collect()
    }

    /// Append `entry`, returning the evicted oldest entry once over capacity.
    pub fn push(&mut self, entry: T) -> Option<T> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Drop every entry and forget the region.
    pub fn clear(&mut self) -> Vec<T> {
        self.region = None;
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }
}
