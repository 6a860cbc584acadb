use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tilestream_core::{ChunkCoord, ChunkKey, LoaderId};

/// Shareable cancel switch for one deferred eviction.
///
/// Any thread holding a clone may cancel; the main loop observes the flag
/// on its next [`LoadReferenceCounter::expire`] pass.
#[derive(Debug, Clone, Default)]
pub struct EvictionHandle(Arc<AtomicBool>);

impl EvictionHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct EvictionTimer {
    deadline: f64,
    handle: EvictionHandle,
}

#[derive(Debug, Default)]
struct LoadCounter {
    loaders: BTreeSet<LoaderId>,
    /// Running iff `loaders` is empty.
    timer: Option<EvictionTimer>,
}

/// Outcome of [`LoadReferenceCounter::request_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
    /// First reference: the chunk must be loaded or generated.
    NeedsLoad,
    /// A pending eviction was cancelled; the chunk is still resident.
    EvictionCancelled,
    /// Another loader already holds the chunk.
    Added,
    /// This loader already held the chunk. No effect.
    AlreadyHeld,
}

/// Outcome of [`LoadReferenceCounter::request_unload`].
#[derive(Debug, Clone, PartialEq)]
pub enum UnloadRequest {
    /// Last reference dropped; eviction fires after the configured delay.
    EvictionScheduled(EvictionHandle),
    /// Other loaders still hold the chunk.
    StillHeld,
    /// This loader did not hold the chunk. No effect.
    NotHeld,
}

impl PartialEq for EvictionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Per-coordinate set of loaders that need a chunk resident, with a
/// cancellable deferred eviction once the set empties.
///
/// Time is supplied by the caller (seconds of sim time), so the counter
/// never reads a clock itself.
pub struct LoadReferenceCounter {
    counters: HashMap<ChunkKey, LoadCounter>,
    eviction_delay: f64,
}

impl LoadReferenceCounter {
    pub fn new(eviction_delay: f64) -> Self {
        Self {
            counters: HashMap::new(),
            eviction_delay,
        }
    }

    pub fn request_load(&mut self, loader: LoaderId, coord: ChunkCoord) -> LoadRequest {
        let key = ChunkKey::from_coord(coord);
        match self.counters.get_mut(&key) {
            None => {
                let mut counter = LoadCounter::default();
                counter.loaders.insert(loader);
                self.counters.insert(key, counter);
                LoadRequest::NeedsLoad
            }
            Some(counter) => {
                if let Some(timer) = counter.timer.take() {
                    timer.handle.cancel();
                    counter.loaders.insert(loader);
                    LoadRequest::EvictionCancelled
                } else if counter.loaders.insert(loader) {
                    LoadRequest::Added
                } else {
                    LoadRequest::AlreadyHeld
                }
            }
        }
    }

    pub fn request_unload(
        &mut self,
        loader: LoaderId,
        coord: ChunkCoord,
        now: f64,
    ) -> UnloadRequest {
        let key = ChunkKey::from_coord(coord);
        let Some(counter) = self.counters.get_mut(&key) else {
            return UnloadRequest::NotHeld;
        };
        if !counter.loaders.remove(&loader) {
            return UnloadRequest::NotHeld;
        }
        if !counter.loaders.is_empty() {
            return UnloadRequest::StillHeld;
        }
        let handle = EvictionHandle::default();
        counter.timer = Some(EvictionTimer {
            deadline: now + self.eviction_delay,
            handle: handle.clone(),
        });
        UnloadRequest::EvictionScheduled(handle)
    }

    /// Remove and return every coordinate whose eviction deadline has passed.
    ///
    /// A timer cancelled through its handle without a new loader arriving
    /// is re-armed from `now`, so an unreferenced chunk always has exactly
    /// one pending eviction.
    pub fn expire(&mut self, now: f64) -> Vec<ChunkCoord> {
        let mut expired = Vec::new();
        let delay = self.eviction_delay;
        for (key, counter) in self.counters.iter_mut() {
            let Some(timer) = counter.timer.as_mut() else {
                continue;
            };
            if timer.handle.is_cancelled() {
                log::debug!("eviction of chunk {} cancelled externally, re-armed", key.coord());
                *timer = EvictionTimer {
                    deadline: now + delay,
                    handle: EvictionHandle::default(),
                };
            } else if timer.deadline <= now {
                expired.push(*key);
            }
        }
        expired.sort();
        expired
            .into_iter()
            .map(|key| {
                self.counters.remove(&key);
                key.coord()
            })
            .collect()
    }

    /// Drop all state for a coordinate (forced unload).
    pub fn forget(&mut self, coord: ChunkCoord) -> bool {
        match self.counters.remove(&ChunkKey::from_coord(coord)) {
            Some(counter) => {
                if let Some(timer) = counter.timer {
                    timer.handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, coord: ChunkCoord) -> bool {
        self.counters.contains_key(&ChunkKey::from_coord(coord))
    }

    /// Loaders currently holding a chunk.
    pub fn loaders(&self, coord: ChunkCoord) -> Vec<LoaderId> {
        self.counters
            .get(&ChunkKey::from_coord(coord))
            .map(|c| c.loaders.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_held_by(&self, loader: LoaderId, coord: ChunkCoord) -> bool {
        self.counters
            .get(&ChunkKey::from_coord(coord))
            .is_some_and(|c| c.loaders.contains(&loader))
    }

    pub fn eviction_pending(&self, coord: ChunkCoord) -> bool {
        self.counters
            .get(&ChunkKey::from_coord(coord))
            .is_some_and(|c| c.timer.is_some())
    }

    /// Coordinates a loader holds, sorted.
    pub fn held_by(&self, loader: LoaderId) -> Vec<ChunkCoord> {
        let mut keys: Vec<ChunkKey> = self
            .counters
            .iter()
            .filter(|(_, c)| c.loaders.contains(&loader))
            .map(|(k, _)| *k)
            .collect();
        keys.sort();
        keys.into_iter().map(|k| k.coord()).collect()
    }

    /// Every tracked coordinate with whether any loader holds it.
    pub fn tracked(&self) -> Vec<(ChunkCoord, bool)> {
        self.counters
            .iter()
            .map(|(k, c)| (k.coord(), !c.loaders.is_empty()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    const A: LoaderId = LoaderId::Local(1);
    const B: LoaderId = LoaderId::Remote(2);

    #[test]
    fn test_first_request_needs_load() {
        let mut rc = LoadReferenceCounter::new(1.0);
        let c = IVec2::new(0, 0);
        assert_eq!(rc.request_load(A, c), LoadRequest::NeedsLoad);
        assert_eq!(rc.request_load(B, c), LoadRequest::Added);
        assert_eq!(rc.loaders(c), vec![A, B]);
    }

    #[test]
    fn test_repeat_request_is_noop() {
        let mut rc = LoadReferenceCounter::new(1.0);
        let c = IVec2::new(4, 4);
        rc.request_load(A, c);
        assert_eq!(rc.request_load(A, c), LoadRequest::AlreadyHeld);
        assert_eq!(rc.loaders(c), vec![A]);
        // One unload fully releases it.
        assert!(matches!(
            rc.request_unload(A, c, 0.0),
            UnloadRequest::EvictionScheduled(_)
        ));
    }

    #[test]
    fn test_timer_only_when_empty() {
        let mut rc = LoadReferenceCounter::new(1.0);
        let c = IVec2::new(0, 0);
        rc.request_load(A, c);
        rc.request_load(B, c);
        assert_eq!(rc.request_unload(A, c, 0.0), UnloadRequest::StillHeld);
        assert!(!rc.eviction_pending(c));
        assert!(matches!(
            rc.request_unload(B, c, 0.0),
            UnloadRequest::EvictionScheduled(_)
        ));
        assert!(rc.eviction_pending(c));
    }

    #[test]
    fn test_reload_cancels_eviction() {
        let mut rc = LoadReferenceCounter::new(1.0);
        let c = IVec2::new(0, 0);
        rc.request_load(A, c);
        let UnloadRequest::EvictionScheduled(handle) = rc.request_unload(A, c, 0.0) else {
            panic!("expected eviction");
        };
        assert_eq!(rc.request_load(B, c), LoadRequest::EvictionCancelled);
        assert!(handle.is_cancelled());
        assert!(!rc.eviction_pending(c));
        assert!(rc.expire(10.0).is_empty());
        assert!(rc.is_tracked(c));
    }

    #[test]
    fn test_expiry_after_delay() {
        let mut rc = LoadReferenceCounter::new(2.0);
        let c = IVec2::new(-3, 1);
        rc.request_load(A, c);
        rc.request_unload(A, c, 1.0);
        assert!(rc.expire(2.5).is_empty());
        assert_eq!(rc.expire(3.0), vec![c]);
        assert!(!rc.is_tracked(c));
        assert!(rc.expire(10.0).is_empty(), "fires exactly once");
    }

    #[test]
    fn test_external_cancel_rearms() {
        let mut rc = LoadReferenceCounter::new(2.0);
        let c = IVec2::new(0, 0);
        rc.request_load(A, c);
        let UnloadRequest::EvictionScheduled(handle) = rc.request_unload(A, c, 0.0) else {
            panic!("expected eviction");
        };
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel())
            .join()
            .expect("cancel thread");

        assert!(rc.expire(2.0).is_empty(), "cancelled timer must not fire");
        assert!(rc.eviction_pending(c));
        assert_eq!(rc.expire(4.0), vec![c]);
    }

    #[test]
    fn test_unload_by_stranger_ignored() {
        let mut rc = LoadReferenceCounter::new(1.0);
        let c = IVec2::new(0, 0);
        assert_eq!(rc.request_unload(A, c, 0.0), UnloadRequest::NotHeld);
        rc.request_load(A, c);
        assert_eq!(rc.request_unload(B, c, 0.0), UnloadRequest::NotHeld);
        assert_eq!(rc.loaders(c), vec![A]);
    }

    #[test]
    fn test_held_by_lists_coords() {
        let mut rc = LoadReferenceCounter::new(1.0);
        rc.request_load(A, IVec2::new(1, 0));
        rc.request_load(A, IVec2::new(0, 0));
        rc.request_load(B, IVec2::new(5, 5));
        assert_eq!(rc.held_by(A), vec![IVec2::new(0, 0), IVec2::new(1, 0)]);
        assert!(rc.forget(IVec2::new(0, 0)));
        assert_eq!(rc.held_by(A), vec![IVec2::new(1, 0)]);
    }
}
