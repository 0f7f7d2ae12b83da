//! Login and steady state for the control and CI-V channels.

use std::time::Instant;

use riglink_core::types::{ResetReason, StateKind};
use tracing::{debug, warn};

use crate::context::ChannelContext;
use crate::keepalive::KeepAlive;
use crate::packet::{IcomPacket, PacketType};
use crate::state::Transition;
use crate::tracked::TrackedPackets;

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Authenticating. The login request is the only tracked packet in the
/// handshake; the radio's LoginResponse acknowledges it by echoing its
/// sequence number.
#[derive(Debug)]
pub(crate) struct LoginState {
    tracked: TrackedPackets,
}

impl LoginState {
    pub fn enter(ctx: &mut ChannelContext, now: Instant) -> Self {
        let mut tracked = TrackedPackets::new(ctx.config.retransmit_interval, ctx.config.max_retries);
        let seq = tracked.send_tracked(ctx, now, |seq, ctx| {
            IcomPacket::login_request(seq, ctx.our_id, ctx.their(), &ctx.credentials, &ctx.client_name)
        });
        debug!(channel = %ctx.channel, seq, user = %ctx.credentials.username, "login sent");
        LoginState { tracked }
    }

    pub fn on_packet(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket) -> Option<Transition> {
        if packet.packet_type() != PacketType::LoginResponse {
            return None;
        }
        let reply = packet.login_reply()?;
        if !self.tracked.acknowledge(packet.sequence()) {
            debug!(channel = %ctx.channel, seq = packet.sequence(), "login reply with no pending request");
            return None;
        }

        if reply.is_success() {
            ctx.status.token = Some(reply.token);
            Some(Transition::To(StateKind::SteadyState))
        } else {
            warn!(channel = %ctx.channel, status = reply.status, "login rejected");
            Some(Transition::Reset(ResetReason::AuthenticationFailed))
        }
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        match self.tracked.on_tick(ctx, now) {
            Ok(()) => None,
            Err(_) => Some(Transition::Reset(ResetReason::DeliveryFailure)),
        }
    }

    pub fn on_exit(&mut self, ctx: &ChannelContext) {
        if !self.tracked.is_empty() {
            debug!(channel = %ctx.channel, pending = self.tracked.len(), "discarding pending login");
        }
        self.tracked.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracked.next_deadline()
    }

    pub fn pending_len(&self) -> usize {
        self.tracked.len()
    }
}

// ---------------------------------------------------------------------------
// SteadyState
// ---------------------------------------------------------------------------

/// Authenticated and idle apart from keepalive.
#[derive(Debug)]
pub(crate) struct SteadyState {
    keepalive: KeepAlive,
}

impl SteadyState {
    pub fn enter(ctx: &mut ChannelContext, now: Instant) -> Self {
        SteadyState {
            keepalive: KeepAlive::start(ctx, now),
        }
    }

    pub fn on_packet(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket, now: Instant) -> Option<Transition> {
        self.keepalive.on_packet(ctx, packet, now);
        None
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        match self.keepalive.on_tick(ctx, now) {
            Ok(()) => None,
            Err(_) => Some(Transition::Reset(ResetReason::LivenessExpired)),
        }
    }

    pub fn next_deadline(&self, ctx: &ChannelContext) -> Instant {
        self.keepalive.next_deadline(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::*;
    use crate::packet::LOGIN_OK;
    use riglink_core::types::Channel;

    #[test]
    fn login_sends_credentials_tracked() {
        let mut ctx = bound_context(Channel::Control);
        let t0 = Instant::now();
        let state = LoginState::enter(&mut ctx, t0);

        let sent = drain(&mut ctx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_type(), PacketType::LoginRequest);
        assert_eq!(sent[0].sequence(), 0);
        assert_eq!(&sent[0].payload()[..4], b"w1aw");
        assert_eq!(state.pending_len(), 1);
        assert_eq!(state.next_deadline(), Some(t0 + ctx.config.retransmit_interval));
    }

    #[test]
    fn successful_reply_keeps_token() {
        let mut ctx = bound_context(Channel::Control);
        let mut state = LoginState::enter(&mut ctx, Instant::now());
        let reply = IcomPacket::login_response(0, THEIR_ID, OUR_ID, LOGIN_OK, 0xBEEF);

        assert_eq!(
            state.on_packet(&mut ctx, &reply),
            Some(Transition::To(StateKind::SteadyState))
        );
        assert_eq!(ctx.status.token, Some(0xBEEF));
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn rejected_reply_resets() {
        let mut ctx = bound_context(Channel::Civ);
        let mut state = LoginState::enter(&mut ctx, Instant::now());
        let reply = IcomPacket::login_response(0, THEIR_ID, OUR_ID, 0xFFFF_FFFF, 0);
        assert_eq!(
            state.on_packet(&mut ctx, &reply),
            Some(Transition::Reset(ResetReason::AuthenticationFailed))
        );
        assert_eq!(ctx.status.token, None);
    }

    #[test]
    fn stray_or_short_reply_is_ignored() {
        let mut ctx = bound_context(Channel::Control);
        let mut state = LoginState::enter(&mut ctx, Instant::now());

        let stray = IcomPacket::login_response(7, THEIR_ID, OUR_ID, LOGIN_OK, 1);
        assert_eq!(state.on_packet(&mut ctx, &stray), None);

        let short = IcomPacket::new(PacketType::LoginResponse, 0, THEIR_ID, OUR_ID, vec![0u8]);
        assert_eq!(state.on_packet(&mut ctx, &short), None);

        assert_eq!(state.pending_len(), 1);
        assert_eq!(ctx.status.token, None);
    }

    #[test]
    fn unanswered_login_fails_after_retry_ceiling() {
        let mut ctx = bound_context(Channel::Control);
        let t0 = Instant::now();
        let i = ctx.config.retransmit_interval;
        let mut state = LoginState::enter(&mut ctx, t0);

        assert_eq!(state.on_tick(&mut ctx, t0 + i), None);
        assert_eq!(state.on_tick(&mut ctx, t0 + 2 * i), None);
        assert_eq!(
            state.on_tick(&mut ctx, t0 + 3 * i),
            Some(Transition::Reset(ResetReason::DeliveryFailure))
        );
        // Original plus two retransmits.
        let sent = drain(&mut ctx);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|p| p.sequence() == 0));
    }

    #[test]
    fn exit_discards_pending() {
        let mut ctx = bound_context(Channel::Control);
        let mut state = LoginState::enter(&mut ctx, Instant::now());
        state.on_exit(&ctx);
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn steady_state_only_reacts_to_keepalive() {
        let mut ctx = bound_context(Channel::Control);
        let t0 = Instant::now();
        let mut state = SteadyState::enter(&mut ctx, t0);

        let stray = IcomPacket::i_am_here(THEIR_ID, OUR_ID, THEIR_ID);
        assert_eq!(state.on_packet(&mut ctx, &stray, t0), None);
        assert!(ctx.outbox.is_empty());

        let window = ctx.config.liveness_window;
        assert_eq!(
            state.on_tick(&mut ctx, t0 + window),
            Some(Transition::Reset(ResetReason::LivenessExpired))
        );
    }
}
