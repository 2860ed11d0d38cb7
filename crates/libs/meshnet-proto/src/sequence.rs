use std::sync::atomic::{AtomicU16, Ordering};

/// Per-host monotonic counter shared by every packet kind, wrapping at
/// `u16::MAX`. The only state in the controller safe to touch from any
/// execution context: a plain atomic increment, never a lock.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU16,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU16::new(0) }
    }

    /// Returns the next sequence number and advances the counter, wrapping
    /// from 65535 back to 0.
    pub fn generate(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
