//! Warm-up filter
//!
//! Camera auto-exposure and auto-gain need a moment to settle after the
//! hardware starts streaming; the first frames are over- or under-exposed
//! and must never reach the encoder. A single saturating counter is shared
//! across the video and audio streams and incremented once per event,
//! whatever its kind. Once it saturates, every subsequent event passes and
//! the gate never re-engages for the lifetime of the session.
//!
//! Delivery threads differ by device, so the counter uses atomic-exchange
//! semantics; it is the only pipeline state touched off the serial task.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct WarmupGate {
    seen: AtomicU32,
    threshold: u32,
}

impl WarmupGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            seen: AtomicU32::new(0),
            threshold,
        }
    }

    /// Count one capture event. Returns true once the gate has saturated,
    /// i.e. for event `threshold + 1` and every event after it.
    pub fn admit(&self) -> bool {
        // Saturating increment: stop bumping once the threshold is reached
        // so the counter can never wrap.
        self.seen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n >= self.threshold { None } else { Some(n + 1) }
            })
            .is_err()
    }

    /// Whether the gate has saturated (without counting an event).
    pub fn saturated(&self) -> bool {
        self.seen.load(Ordering::Acquire) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swallows_exactly_threshold_events() {
        let gate = WarmupGate::new(35);
        for i in 0..35 {
            assert!(!gate.admit(), "event {} should be suppressed", i + 1);
        }
        assert!(gate.admit(), "event 36 should pass");
        assert!(gate.admit(), "events never re-engage the gate");
    }

    #[test]
    fn test_zero_threshold_passes_everything() {
        let gate = WarmupGate::new(0);
        assert!(gate.admit());
        assert!(gate.saturated());
    }

    #[test]
    fn test_saturated_is_passive() {
        let gate = WarmupGate::new(2);
        assert!(!gate.saturated());
        gate.admit();
        gate.admit();
        assert!(gate.saturated());
        // saturated() must not consume events
        assert!(gate.admit());
    }
}
