//! Integration tests for the LRU replacer

use minisql::buffer::{LruReplacer, Replacer};
use minisql::common::FrameId;

#[test]
fn test_lru_eviction_order() {
    let mut replacer = LruReplacer::new();

    for i in 0..5 {
        replacer.unpin(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 5);

    // Least recently unpinned goes first
    for i in 0..5 {
        assert_eq!(replacer.victim(), Some(FrameId::new(i)));
    }
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_lru_pinned_frames_not_evicted() {
    let mut replacer = LruReplacer::new();

    for i in 0..4 {
        replacer.unpin(FrameId::new(i));
    }
    replacer.pin(FrameId::new(0));
    replacer.pin(FrameId::new(2));
    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_lru_repin_moves_to_back() {
    let mut replacer = LruReplacer::new();

    replacer.unpin(FrameId::new(0));
    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));

    replacer.pin(FrameId::new(0));
    replacer.unpin(FrameId::new(0));

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_duplicate_unpin_keeps_position() {
    let mut replacer = LruReplacer::new();

    replacer.unpin(FrameId::new(0));
    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(0));
    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_pin_unknown_frame_is_noop() {
    let mut replacer = LruReplacer::new();
    replacer.pin(FrameId::new(9));
    assert_eq!(replacer.size(), 0);

    replacer.unpin(FrameId::new(9));
    assert_eq!(replacer.victim(), Some(FrameId::new(9)));
}
