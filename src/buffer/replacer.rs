use std::collections::{HashSet, VecDeque};

use crate::common::config::FrameId;

/// A plain LRU replacement policy over buffer pool frames.
///
/// Exposes exactly the three operations the buffer pool needs: pick a
/// victim among unpinned frames, and track when a frame becomes pinned or
/// unpinned. `record_access`/`set_evictable`/LRU-K distance bookkeeping
/// (as the replacer this crate's buffer pool module was adapted from
/// ships) aren't part of the contract here -- the buffer pool only ever
/// needs "give me something to evict" and "this frame is/isn't a
/// candidate right now."
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Unpinned frames in least-recently-used-first order. The back of the
    /// queue is most recently unpinned.
    queue: VecDeque<FrameId>,
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            evictable: HashSet::new(),
        }
    }

    /// Picks the least-recently-used evictable frame and removes it from
    /// the replacer's bookkeeping. Returns `None` if every tracked frame is
    /// pinned.
    pub fn victim(&mut self) -> Option<FrameId> {
        let pos = self.queue.iter().position(|f| self.evictable.contains(f))?;
        let frame_id = self.queue.remove(pos).unwrap();
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    /// Marks `frame_id` as pinned: no longer a candidate for eviction.
    pub fn pin(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
        self.queue.retain(|f| *f != frame_id);
    }

    /// Marks `frame_id` as unpinned: now a candidate for eviction, and the
    /// most recently used one.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.evictable.insert(frame_id) {
            self.queue.push_back(frame_id);
        } else {
            self.queue.retain(|f| *f != frame_id);
            self.queue.push_back(frame_id);
        }
    }

    /// Stops tracking `frame_id` entirely, e.g. after the page it held was
    /// deleted from the buffer pool.
    pub fn remove(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
        self.queue.retain(|f| *f != frame_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_picks_least_recently_unpinned() {
        let mut r = LruReplacer::new();
        r.unpin(1);
        r.unpin(2);
        r.unpin(3);
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), Some(2));
        r.unpin(4);
        assert_eq!(r.victim(), Some(3));
        assert_eq!(r.victim(), Some(4));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn pinned_frames_are_not_candidates() {
        let mut r = LruReplacer::new();
        r.unpin(1);
        r.unpin(2);
        r.pin(1);
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn re_unpinning_moves_frame_to_most_recent() {
        let mut r = LruReplacer::new();
        r.unpin(1);
        r.unpin(2);
        r.unpin(1);
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), Some(1));
    }
}
