//! Liveness pings for established channels.
//!
//! Pings go out every `ping_interval`, untracked. Liveness is measured from
//! the last inbound packet of any type, not from ping replies: a channel
//! that carries audio but whose ping replies are lost is still alive.

use std::time::Instant;

use tracing::{debug, trace};

use crate::context::ChannelContext;
use crate::packet::{IcomPacket, PacketType};

/// No inbound traffic within the liveness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessExpired;

#[derive(Debug)]
pub(crate) struct KeepAlive {
    next_ping: Instant,
    last_traffic: Instant,
    /// Sequence and send time of the last ping not yet answered.
    outstanding: Option<(u16, Instant)>,
}

impl KeepAlive {
    /// Start the ping timer. The window counts from `now`.
    pub fn start(ctx: &ChannelContext, now: Instant) -> Self {
        KeepAlive {
            next_ping: now + ctx.config.ping_interval,
            last_traffic: now,
            outstanding: None,
        }
    }

    /// Handle an inbound packet. Every packet refreshes liveness; pings
    /// from the radio are answered and replies to ours give the RTT.
    ///
    /// Returns `true` if the packet was a ping or ping reply.
    pub fn on_packet(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket, now: Instant) -> bool {
        self.last_traffic = now;

        match packet.packet_type() {
            PacketType::PingRequest => {
                let reply = IcomPacket::ping_response(packet, ctx.our_id, ctx.their());
                ctx.transmit(&reply);
                true
            }
            PacketType::PingResponse => {
                match self.outstanding {
                    Some((seq, sent_at)) if seq == packet.sequence() => {
                        let rtt = now.saturating_duration_since(sent_at);
                        trace!(channel = %ctx.channel, rtt_us = rtt.as_micros() as u64, "ping reply");
                        ctx.status.round_trip = Some(rtt);
                        self.outstanding = None;
                    }
                    _ => trace!(channel = %ctx.channel, seq = packet.sequence(), "stale ping reply"),
                }
                true
            }
            _ => false,
        }
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Result<(), LivenessExpired> {
        if now.saturating_duration_since(self.last_traffic) >= ctx.config.liveness_window {
            debug!(channel = %ctx.channel, "no inbound traffic within liveness window");
            return Err(LivenessExpired);
        }

        if now >= self.next_ping {
            let seq = ctx.counters.next_ping();
            let ping = IcomPacket::ping_request(seq, ctx.our_id, ctx.their(), ctx.timestamp_ms(now));
            ctx.transmit(&ping);
            self.outstanding = Some((seq, now));
            self.next_ping = now + ctx.config.ping_interval;
        }
        Ok(())
    }

    pub fn next_deadline(&self, ctx: &ChannelContext) -> Instant {
        self.next_ping
            .min(self.last_traffic + ctx.config.liveness_window)
    }
}
