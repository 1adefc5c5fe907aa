//! Held-key tracking for the hook host.
//!
//! A low-level hook sees every auto-repeat as another key-down. The latch
//! keeps one bit per relevant key so that only the up-to-down transition is
//! published.

use std::sync::atomic::{AtomicU32, Ordering};

/// Latch bit for the Num Lock key (cells use 0..=8, Back uses 9).
pub const MASK_NUMLOCK: u32 = 1 << 10;

/// Mask bit for a key index.
#[inline]
pub fn key_mask(index: u32) -> u32 {
    1 << index
}

/// Bitmask of keys currently held down.
#[derive(Debug, Default)]
pub struct KeyLatch {
    mask: AtomicU32,
}

impl KeyLatch {
    /// Create an empty latch.
    pub const fn new() -> Self {
        Self {
            mask: AtomicU32::new(0),
        }
    }

    /// Mark keys as held. Returns `true` if none of them were held before,
    /// i.e. this is a fresh press rather than an auto-repeat.
    #[inline]
    pub fn press(&self, mask: u32) -> bool {
        self.mask.fetch_or(mask, Ordering::SeqCst) & mask == 0
    }

    /// Mark keys as released.
    #[inline]
    pub fn release(&self, mask: u32) {
        self.mask.fetch_and(!mask, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn is_held(&self, mask: u32) -> bool {
        self.mask.load(Ordering::SeqCst) & mask != 0
    }

    /// Forget all held keys.
    #[inline]
    pub fn reset(&self) {
        self.mask.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release_cycle() {
        let latch = KeyLatch::new();
        let five = key_mask(4);

        assert!(latch.press(five));
        assert!(latch.is_held(five));
        // Auto-repeat.
        assert!(!latch.press(five));
        assert!(!latch.press(five));

        latch.release(five);
        assert!(!latch.is_held(five));
        assert!(latch.press(five));
    }

    #[test]
    fn test_keys_are_independent() {
        let latch = KeyLatch::new();
        assert!(latch.press(key_mask(0)));
        assert!(latch.press(key_mask(9)));
        assert!(latch.press(MASK_NUMLOCK));

        latch.release(key_mask(0));
        assert!(!latch.is_held(key_mask(0)));
        assert!(latch.is_held(key_mask(9)));
        assert!(latch.is_held(MASK_NUMLOCK));

        latch.reset();
        assert!(!latch.is_held(key_mask(9) | MASK_NUMLOCK));
    }
}
