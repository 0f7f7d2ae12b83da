//! The per-channel protocol states.
//!
//! One [`State`] value is active per channel. Each variant owns its own
//! timers (as deadlines) and, for Login, its pending-packet table, so
//! replacing the value on a transition disarms everything the old state
//! armed before the new state's entry hook runs.

use std::time::Instant;

use riglink_core::types::{ResetReason, StateKind};

use crate::context::ChannelContext;
use crate::discovery::{AreYouReadyState, AreYouThereState};
use crate::login::{LoginState, SteadyState};
use crate::packet::IcomPacket;
use crate::streaming::AudioStreamingState;

/// What a state asks the machine to do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Move forward to another state.
    To(StateKind),
    /// Fall back to AreYouThere, discarding the session.
    Reset(ResetReason),
}

#[derive(Debug)]
pub(crate) enum State {
    AreYouThere(AreYouThereState),
    AreYouReady(AreYouReadyState),
    Login(LoginState),
    SteadyState(SteadyState),
    Audio(AudioStreamingState),
}

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            State::AreYouThere(_) => StateKind::AreYouThere,
            State::AreYouReady(s) if s.is_audio() => StateKind::AreYouReadyAudio,
            State::AreYouReady(_) => StateKind::AreYouReady,
            State::Login(_) => StateKind::Login,
            State::SteadyState(_) => StateKind::SteadyState,
            State::Audio(_) => StateKind::Audio,
        }
    }

    /// Construct `kind` and run its entry hook.
    pub fn enter(kind: StateKind, ctx: &mut ChannelContext, now: Instant) -> State {
        match kind {
            StateKind::AreYouThere => State::AreYouThere(AreYouThereState::enter(ctx, now)),
            StateKind::AreYouReady => State::AreYouReady(AreYouReadyState::enter(ctx, false, now)),
            StateKind::AreYouReadyAudio => State::AreYouReady(AreYouReadyState::enter(ctx, true, now)),
            StateKind::Login => State::Login(LoginState::enter(ctx, now)),
            StateKind::SteadyState => State::SteadyState(SteadyState::enter(ctx, now)),
            StateKind::Audio => State::Audio(AudioStreamingState::enter(ctx, now)),
        }
    }

    /// Exit hook. Consumes the state so none of its timers survive.
    pub fn exit(self, ctx: &mut ChannelContext) {
        if let State::Login(mut login) = self {
            login.on_exit(ctx);
        }
    }

    pub fn on_receive_packet(
        &mut self,
        ctx: &mut ChannelContext,
        packet: &IcomPacket,
        now: Instant,
    ) -> Option<Transition> {
        match self {
            State::AreYouThere(s) => s.on_packet(ctx, packet),
            State::AreYouReady(s) => s.on_packet(packet),
            State::Login(s) => s.on_packet(ctx, packet),
            State::SteadyState(s) => s.on_packet(ctx, packet, now),
            State::Audio(s) => s.on_packet(ctx, packet, now),
        }
    }

    pub fn on_timer_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        match self {
            State::AreYouThere(s) => s.on_tick(ctx, now),
            State::AreYouReady(s) => s.on_tick(ctx, now),
            State::Login(s) => s.on_tick(ctx, now),
            State::SteadyState(s) => s.on_tick(ctx, now),
            State::Audio(s) => s.on_tick(ctx, now),
        }
    }

    /// The earliest instant at which `on_timer_tick` has work to do.
    pub fn next_deadline(&self, ctx: &ChannelContext) -> Option<Instant> {
        match self {
            State::AreYouThere(s) => Some(s.next_deadline()),
            State::AreYouReady(s) => Some(s.next_deadline()),
            State::Login(s) => s.next_deadline(),
            State::SteadyState(s) => Some(s.next_deadline(ctx)),
            State::Audio(s) => Some(s.next_deadline(ctx)),
        }
    }

    /// Tracked packets awaiting acknowledgment.
    pub fn pending_len(&self) -> usize {
        match self {
            State::Login(s) => s.pending_len(),
            _ => 0,
        }
    }
}
