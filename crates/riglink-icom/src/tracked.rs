//! Tracked-packet retransmission.
//!
//! A state that needs guaranteed delivery embeds a [`TrackedPackets`]
//! table. Each tracked send is recorded under its sequence number and
//! retransmitted byte-for-byte every `retransmit_interval` until a reply
//! carrying the same sequence number arrives or the retry ceiling is hit.
//!
//! The table belongs to the state that created it. Dropping the state
//! drops the table, so no entry outlives a transition.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::context::ChannelContext;
use crate::packet::IcomPacket;

/// One unacknowledged tracked packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPacket {
    pub sequence: u16,
    pub encoded: Vec<u8>,
    pub sent_at: Instant,
    pub retry_count: u32,
}

/// A tracked packet ran out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub sequence: u16,
}

/// Pending-packet table for one state.
#[derive(Debug)]
pub(crate) struct TrackedPackets {
    pending: BTreeMap<u16, PendingPacket>,
    interval: Duration,
    max_retries: u32,
}

impl TrackedPackets {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        TrackedPackets {
            pending: BTreeMap::new(),
            interval,
            max_retries,
        }
    }

    /// Assign the next tracked sequence number, build the packet with it,
    /// transmit and record it. Returns the sequence number used.
    pub fn send_tracked(
        &mut self,
        ctx: &mut ChannelContext,
        now: Instant,
        build: impl FnOnce(u16, &ChannelContext) -> IcomPacket,
    ) -> u16 {
        let sequence = ctx.counters.next_tracked();
        let packet = build(sequence, ctx);
        let encoded = packet.encode();
        ctx.outbox.push_back(encoded.clone());
        trace!(channel = %ctx.channel, seq = sequence, "tracked send");
        self.pending.insert(
            sequence,
            PendingPacket {
                sequence,
                encoded,
                sent_at: now,
                retry_count: 0,
            },
        );
        sequence
    }

    /// Retransmit every entry whose age has reached the interval.
    ///
    /// Entries that hit the retry ceiling are dropped and the first of them
    /// is reported.
    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Result<(), DeliveryFailure> {
        let mut exhausted = Vec::new();

        for (seq, entry) in self.pending.iter_mut() {
            if now.saturating_duration_since(entry.sent_at) < self.interval {
                continue;
            }
            entry.retry_count += 1;
            if entry.retry_count >= self.max_retries {
                exhausted.push(*seq);
                continue;
            }
            ctx.outbox.push_back(entry.encoded.clone());
            ctx.status.retransmits += 1;
            entry.sent_at = now;
            debug!(channel = %ctx.channel, seq = *seq, retry = entry.retry_count, "retransmit");
        }

        for seq in &exhausted {
            self.pending.remove(seq);
        }
        match exhausted.first() {
            Some(&sequence) => {
                debug!(channel = %ctx.channel, seq = sequence, "giving up on tracked packet");
                Err(DeliveryFailure { sequence })
            }
            None => Ok(()),
        }
    }

    /// Remove the entry for `sequence`. Returns `false` for a reply with
    /// no matching entry (late duplicate or stray).
    pub fn acknowledge(&mut self, sequence: u16) -> bool {
        self.pending.remove(&sequence).is_some()
    }

    #[cfg(test)]
    pub fn get(&self, sequence: u16) -> Option<&PendingPacket> {
        self.pending.get(&sequence)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// When the oldest entry next needs attention.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|entry| entry.sent_at + self.interval)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::*;
    use riglink_core::types::Channel;

    const I: Duration = Duration::from_millis(200);

    fn ping(seq: u16, ctx: &ChannelContext) -> IcomPacket {
        IcomPacket::ping_request(seq, ctx.our_id, ctx.their(), 0)
    }

    #[test]
    fn send_records_and_transmits() {
        let mut ctx = bound_context(Channel::Control);
        let mut table = TrackedPackets::new(I, 3);
        let t0 = Instant::now();

        assert_eq!(table.send_tracked(&mut ctx, t0, ping), 0);
        assert_eq!(table.send_tracked(&mut ctx, t0, ping), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(ctx.outbox.len(), 2);

        let entry = table.get(1).unwrap();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.sent_at, t0);
        assert_eq!(Some(&entry.encoded), ctx.outbox.back());
        assert_eq!(table.next_deadline(), Some(t0 + I));
    }

    #[test]
    fn retransmits_identical_bytes_on_schedule() {
        let mut ctx = bound_context(Channel::Control);
        let mut table = TrackedPackets::new(I, 3);
        let t0 = Instant::now();
        table.send_tracked(&mut ctx, t0, ping);
        let original = ctx.outbox.pop_front().unwrap();

        // Not yet due.
        assert!(table.on_tick(&mut ctx, t0 + I / 2).is_ok());
        assert!(ctx.outbox.is_empty());

        assert!(table.on_tick(&mut ctx, t0 + I).is_ok());
        assert_eq!(ctx.outbox.pop_front(), Some(original.clone()));
        assert_eq!(table.get(0).unwrap().retry_count, 1);
        assert_eq!(table.next_deadline(), Some(t0 + 2 * I));

        assert!(table.on_tick(&mut ctx, t0 + 2 * I).is_ok());
        assert_eq!(ctx.outbox.pop_front(), Some(original));
        assert_eq!(ctx.status.retransmits, 2);

        assert_eq!(
            table.on_tick(&mut ctx, t0 + 3 * I),
            Err(DeliveryFailure { sequence: 0 })
        );
        assert!(ctx.outbox.is_empty());
        assert!(table.is_empty());
        assert_eq!(table.next_deadline(), None);
    }

    #[test]
    fn acknowledge_removes_only_matching_entry() {
        let mut ctx = bound_context(Channel::Control);
        let mut table = TrackedPackets::new(I, 3);
        let t0 = Instant::now();
        table.send_tracked(&mut ctx, t0, ping);
        table.send_tracked(&mut ctx, t0, ping);

        assert!(!table.acknowledge(9));
        assert_eq!(table.len(), 2);
        assert!(table.acknowledge(0));
        assert!(!table.acknowledge(0));
        assert_eq!(table.len(), 1);
        assert!(table.get(1).is_some());
    }

    #[test]
    fn acknowledged_entry_is_never_retransmitted() {
        let mut ctx = bound_context(Channel::Control);
        let mut table = TrackedPackets::new(I, 3);
        let t0 = Instant::now();
        table.send_tracked(&mut ctx, t0, ping);
        ctx.outbox.clear();
        table.acknowledge(0);

        assert!(table.on_tick(&mut ctx, t0 + 10 * I).is_ok());
        assert!(ctx.outbox.is_empty());
    }

    #[test]
    fn clear_empties_table() {
        let mut ctx = bound_context(Channel::Control);
        let mut table = TrackedPackets::new(I, 3);
        table.send_tracked(&mut ctx, Instant::now(), ping);
        table.clear();
        assert!(table.is_empty());
    }
}
