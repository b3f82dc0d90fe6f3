use lru::LruCache;

use crate::common::FrameId;

use super::Replacer;

/// Evicts the frame that has been unpinned the longest.
///
/// Recency is the time of the *last unpin*, not of the last access: a frame
/// re-pinned and unpinned again moves to the most-recent end.
pub struct LruReplacer {
    frames: LruCache<FrameId, ()>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            frames: LruCache::unbounded(),
        }
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        self.frames.pop_lru().map(|(frame_id, _)| frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.frames.pop(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        // `put` would refresh recency; a duplicate unpin must not.
        if !self.frames.contains(&frame_id) {
            self.frames.put(frame_id, ());
        }
    }

    fn size(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_victim_order() {
        let mut replacer = LruReplacer::new();

        for i in 1..=6 {
            replacer.unpin(FrameId::new(i));
        }
        replacer.unpin(FrameId::new(1));
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));

        replacer.pin(FrameId::new(3));
        replacer.pin(FrameId::new(4));
        assert_eq!(replacer.size(), 2);

        replacer.unpin(FrameId::new(4));
        assert_eq!(replacer.victim(), Some(FrameId::new(5)));
        assert_eq!(replacer.victim(), Some(FrameId::new(6)));
        assert_eq!(replacer.victim(), Some(FrameId::new(4)));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_pin_untracked_is_noop() {
        let mut replacer = LruReplacer::new();
        replacer.pin(FrameId::new(9));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }
}
