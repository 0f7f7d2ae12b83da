//! 16-bit sequence numbers.
//!
//! All sequence spaces wrap modulo 2^16. Ordering uses serial-number
//! arithmetic: `a` is newer than `b` when `a - b` (mod 2^16) lies in
//! `1..0x8000`. Two numbers exactly half the ring apart are unordered.

/// Returns `true` when `candidate` is strictly newer than `reference`.
#[inline]
pub fn is_newer(candidate: u16, reference: u16) -> bool {
    let diff = candidate.wrapping_sub(reference);
    diff != 0 && diff < 0x8000
}

/// The per-channel send counters.
///
/// Each counter yields its current value and then advances by one,
/// wrapping from 65535 to 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCounters {
    tracked: u16,
    ping: u16,
    audio: u16,
}

impl SequenceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number for a tracked packet.
    pub fn next_tracked(&mut self) -> u16 {
        advance(&mut self.tracked)
    }

    /// Next ping sequence number.
    pub fn next_ping(&mut self) -> u16 {
        advance(&mut self.ping)
    }

    /// Next outbound audio frame sequence number.
    pub fn next_audio(&mut self) -> u16 {
        advance(&mut self.audio)
    }

    /// Back to zero, for a fresh session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn advance(counter: &mut u16) -> u16 {
    let current = *counter;
    *counter = counter.wrapping_add(1);
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_boundary() {
        assert!(is_newer(0, 65535));
        assert!(!is_newer(65535, 0));
        assert!(is_newer(1, 0));
        assert!(!is_newer(0, 1));
        assert!(!is_newer(5, 5));
    }

    #[test]
    fn ordering_holds_over_the_whole_ring() {
        for a in 0..=u16::MAX {
            for offset in [1u16, 2, 100, 0x7FFF] {
                let b = a.wrapping_add(offset);
                assert!(is_newer(b, a), "{b} should be newer than {a}");
                assert!(!is_newer(a, b), "{a} should be older than {b}");
            }
            assert!(!is_newer(a, a));
            let opposite = a.wrapping_add(0x8000);
            assert!(!is_newer(opposite, a));
            assert!(!is_newer(a, opposite));
        }
    }

    #[test]
    fn counters_are_independent() {
        let mut c = SequenceCounters::new();
        assert_eq!(c.next_tracked(), 0);
        assert_eq!(c.next_tracked(), 1);
        assert_eq!(c.next_ping(), 0);
        assert_eq!(c.next_audio(), 0);
        assert_eq!(c.next_tracked(), 2);
    }

    #[test]
    fn counters_wrap() {
        let mut c = SequenceCounters {
            tracked: u16::MAX,
            ping: 0,
            audio: u16::MAX,
        };
        assert_eq!(c.next_tracked(), u16::MAX);
        assert_eq!(c.next_tracked(), 0);
        assert_eq!(c.next_audio(), u16::MAX);
        assert_eq!(c.next_audio(), 0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut c = SequenceCounters::new();
        c.next_tracked();
        c.next_ping();
        c.next_audio();
        c.reset();
        assert_eq!(c, SequenceCounters::new());
    }
}
