use crate::common::FrameId;

/// Eviction policy over the frames of a buffer pool.
///
/// Only frames with a pin count of zero are tracked. The buffer pool calls
/// every method while holding its own lock, so implementations need no
/// internal synchronization.
pub trait Replacer: Send {
    /// Removes and returns the frame to evict next, if any.
    fn victim(&mut self) -> Option<FrameId>;

    /// Makes a frame ineligible for eviction. No-op if it is not tracked.
    fn pin(&mut self, frame_id: FrameId);

    /// Makes a frame eligible for eviction. No-op if it is already tracked.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
