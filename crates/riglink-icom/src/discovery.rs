//! Discovery handshake: AreYouThere and AreYouReady.
//!
//! Both probes are untracked. They are idempotent, so they are simply
//! resent every `handshake_interval` until the radio answers or
//! `handshake_max_attempts` probes have gone unanswered.

use std::time::Instant;

use riglink_core::types::{ResetReason, StateKind};
use tracing::debug;

use crate::context::ChannelContext;
use crate::packet::{IcomPacket, PacketType};
use crate::state::Transition;

/// Resend schedule shared by both discovery states.
#[derive(Debug)]
struct Probe {
    attempts: u32,
    next_probe: Instant,
}

impl Probe {
    fn first(ctx: &mut ChannelContext, packet: &IcomPacket, now: Instant) -> Probe {
        ctx.transmit(packet);
        Probe {
            attempts: 1,
            next_probe: now + ctx.config.handshake_interval,
        }
    }

    /// Resend if due. Returns `false` once the attempt budget is spent.
    fn on_tick(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket, now: Instant) -> bool {
        if now < self.next_probe {
            return true;
        }
        if self.attempts >= ctx.config.handshake_max_attempts {
            return false;
        }
        ctx.transmit(packet);
        self.attempts += 1;
        self.next_probe = now + ctx.config.handshake_interval;
        true
    }
}

// ---------------------------------------------------------------------------
// AreYouThere
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct AreYouThereState {
    probe: Probe,
}

impl AreYouThereState {
    pub fn enter(ctx: &mut ChannelContext, now: Instant) -> Self {
        let packet = IcomPacket::are_you_there(ctx.our_id);
        AreYouThereState {
            probe: Probe::first(ctx, &packet, now),
        }
    }

    pub fn on_packet(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket) -> Option<Transition> {
        if packet.packet_type() != PacketType::IAmHere {
            return None;
        }
        let their_id = packet.device_identifier();
        debug!(channel = %ctx.channel, their_id, "radio found");
        ctx.bind(their_id);

        let next = if ctx.channel.requires_login() {
            StateKind::AreYouReady
        } else {
            StateKind::AreYouReadyAudio
        };
        Some(Transition::To(next))
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        let packet = IcomPacket::are_you_there(ctx.our_id);
        if self.probe.on_tick(ctx, &packet, now) {
            None
        } else {
            Some(Transition::Reset(ResetReason::HandshakeTimeout))
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.probe.next_probe
    }

    #[cfg(test)]
    pub fn attempts(&self) -> u32 {
        self.probe.attempts
    }
}

// ---------------------------------------------------------------------------
// AreYouReady / AreYouReadyAudio
// ---------------------------------------------------------------------------

/// Readiness wait. The audio flavour goes straight to streaming; the
/// others go on to login.
#[derive(Debug)]
pub(crate) struct AreYouReadyState {
    audio: bool,
    probe: Probe,
}

impl AreYouReadyState {
    pub fn enter(ctx: &mut ChannelContext, audio: bool, now: Instant) -> Self {
        let packet = IcomPacket::are_you_ready(ctx.our_id, ctx.their());
        AreYouReadyState {
            audio,
            probe: Probe::first(ctx, &packet, now),
        }
    }

    pub fn is_audio(&self) -> bool {
        self.audio
    }

    pub fn on_packet(&mut self, packet: &IcomPacket) -> Option<Transition> {
        if packet.packet_type() != PacketType::IAmReady {
            return None;
        }
        if self.audio {
            Some(Transition::To(StateKind::Audio))
        } else {
            Some(Transition::To(StateKind::Login))
        }
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        let packet = IcomPacket::are_you_ready(ctx.our_id, ctx.their());
        if self.probe.on_tick(ctx, &packet, now) {
            None
        } else {
            Some(Transition::Reset(ResetReason::HandshakeTimeout))
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.probe.next_probe
    }
}
