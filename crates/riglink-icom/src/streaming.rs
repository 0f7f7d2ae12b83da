//! Audio streaming on the audio channel.
//!
//! Outbound: every `audio_frame_interval` one block is pulled from the
//! pipeline and sent untracked with the next audio sequence number. An
//! empty pipeline just skips the frame.
//!
//! Inbound: a frame is accepted only if its sequence number is newer than
//! the last accepted one. Duplicates and reordered stragglers are dropped;
//! gaps are never filled.

use std::time::Instant;

use riglink_core::types::ResetReason;
use tracing::trace;

use crate::context::ChannelContext;
use crate::keepalive::KeepAlive;
use crate::packet::{IcomPacket, PacketType};
use crate::seq;
use crate::state::Transition;

#[derive(Debug)]
pub(crate) struct AudioStreamingState {
    keepalive: KeepAlive,
    next_frame: Instant,
    last_accepted: Option<u16>,
}

impl AudioStreamingState {
    pub fn enter(ctx: &mut ChannelContext, now: Instant) -> Self {
        AudioStreamingState {
            keepalive: KeepAlive::start(ctx, now),
            next_frame: now + ctx.config.audio_frame_interval,
            last_accepted: None,
        }
    }

    pub fn on_packet(&mut self, ctx: &mut ChannelContext, packet: &IcomPacket, now: Instant) -> Option<Transition> {
        self.keepalive.on_packet(ctx, packet, now);
        if packet.packet_type() != PacketType::AudioData {
            return None;
        }

        let seq = packet.sequence();
        let fresh = match self.last_accepted {
            Some(last) => seq::is_newer(seq, last),
            None => true,
        };
        if !fresh {
            trace!(channel = %ctx.channel, seq, last = ?self.last_accepted, "stale audio frame");
            ctx.status.audio_dropped += 1;
            return None;
        }

        self.last_accepted = Some(seq);
        if let Some(audio) = ctx.audio.as_mut() {
            audio.push_received_block(packet.pcm());
        }
        None
    }

    pub fn on_tick(&mut self, ctx: &mut ChannelContext, now: Instant) -> Option<Transition> {
        if self.keepalive.on_tick(ctx, now).is_err() {
            return Some(Transition::Reset(ResetReason::LivenessExpired));
        }

        if now >= self.next_frame {
            let block = ctx.audio.as_mut().and_then(|audio| audio.pull_next_block());
            if let Some(block) = block {
                let seq = ctx.counters.next_audio();
                let packet = IcomPacket::audio_data(seq, ctx.our_id, ctx.their(), &block);
                ctx.transmit(&packet);
            }
            let interval = ctx.config.audio_frame_interval;
            self.next_frame += interval;
            // After a stall, resume the cadence from now instead of bursting.
            if self.next_frame <= now {
                self.next_frame = now + interval;
            }
        }
        None
    }

    pub fn next_deadline(&self, ctx: &ChannelContext) -> Instant {
        self.next_frame.min(self.keepalive.next_deadline(ctx))
    }

    #[cfg(test)]
    pub fn last_accepted(&self) -> Option<u16> {
        self.last_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::*;
    use riglink_core::audio::PcmBlock;
    use riglink_core::types::Channel;
    use riglink_test_harness::MockAudioPipeline;
    use std::time::Duration;

    fn audio_context() -> (ChannelContext, MockAudioPipeline) {
        let mut ctx = bound_context(Channel::Audio);
        let pipeline = MockAudioPipeline::new();
        ctx.audio = Some(Box::new(pipeline.clone()));
        (ctx, pipeline)
    }

    fn frame(seq: u16, sample: i16) -> IcomPacket {
        IcomPacket::audio_data(seq, THEIR_ID, OUR_ID, &PcmBlock::new(vec![sample]))
    }

    #[test]
    fn inbound_frames_are_sequence_checked() {
        let (mut ctx, pipeline) = audio_context();
        let t0 = Instant::now();
        let mut state = AudioStreamingState::enter(&mut ctx, t0);

        state.on_packet(&mut ctx, &frame(10, 10), t0);
        state.on_packet(&mut ctx, &frame(12, 12), t0);
        state.on_packet(&mut ctx, &frame(11, 11), t0);
        state.on_packet(&mut ctx, &frame(12, 12), t0);

        let received: Vec<i16> = pipeline.received().iter().map(|b| b.samples[0]).collect();
        assert_eq!(received, vec![10, 12]);
        assert_eq!(state.last_accepted(), Some(12));
        assert_eq!(ctx.status.audio_dropped, 2);
    }

    #[test]
    fn inbound_accepts_across_wrap() {
        let (mut ctx, pipeline) = audio_context();
        let t0 = Instant::now();
        let mut state = AudioStreamingState::enter(&mut ctx, t0);

        state.on_packet(&mut ctx, &frame(65534, 1), t0);
        state.on_packet(&mut ctx, &frame(65535, 2), t0);
        state.on_packet(&mut ctx, &frame(0, 3), t0);
        state.on_packet(&mut ctx, &frame(65535, 4), t0);

        assert_eq!(pipeline.received().len(), 3);
        assert_eq!(state.last_accepted(), Some(0));
    }

    #[test]
    fn outbound_frames_follow_cadence() {
        let (mut ctx, pipeline) = audio_context();
        let t0 = Instant::now();
        let interval = ctx.config.audio_frame_interval;
        let mut state = AudioStreamingState::enter(&mut ctx, t0);
        for n in 0..3 {
            pipeline.queue_outbound(PcmBlock::new(vec![n; 160]));
        }

        assert_eq!(state.next_deadline(&ctx), t0 + interval);
        state.on_tick(&mut ctx, t0 + interval / 2);
        assert!(ctx.outbox.is_empty());

        state.on_tick(&mut ctx, t0 + interval);
        state.on_tick(&mut ctx, t0 + 2 * interval);
        let sent = drain(&mut ctx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].packet_type(), PacketType::AudioData);
        assert_eq!(sent[0].sequence(), 0);
        assert_eq!(sent[1].sequence(), 1);
        assert_eq!(sent[1].pcm(), PcmBlock::new(vec![1; 160]));
        assert_eq!(pipeline.outbound_remaining(), 1);
    }

    #[test]
    fn empty_pipeline_skips_frame() {
        let (mut ctx, _pipeline) = audio_context();
        let t0 = Instant::now();
        let interval = ctx.config.audio_frame_interval;
        let mut state = AudioStreamingState::enter(&mut ctx, t0);

        assert_eq!(state.on_tick(&mut ctx, t0 + interval), None);
        assert!(ctx.outbox.is_empty());
        assert_eq!(state.next_deadline(&ctx), t0 + 2 * interval);
    }

    #[test]
    fn stall_does_not_burst() {
        let (mut ctx, pipeline) = audio_context();
        let t0 = Instant::now();
        let interval = ctx.config.audio_frame_interval;
        let mut state = AudioStreamingState::enter(&mut ctx, t0);
        for _ in 0..5 {
            pipeline.queue_outbound(PcmBlock::new(vec![0; 4]));
        }

        let late = t0 + interval * 5 + Duration::from_millis(3);
        state.on_tick(&mut ctx, late);
        assert_eq!(drain(&mut ctx).len(), 1);
        assert_eq!(state.next_deadline(&ctx), late + interval);
    }

    #[test]
    fn non_audio_packets_are_ignored() {
        let (mut ctx, pipeline) = audio_context();
        let t0 = Instant::now();
        let mut state = AudioStreamingState::enter(&mut ctx, t0);

        let stray = IcomPacket::login_response(0, THEIR_ID, OUR_ID, 0, 0);
        assert_eq!(state.on_packet(&mut ctx, &stray, t0), None);
        assert!(pipeline.received().is_empty());
        assert_eq!(state.last_accepted(), None);
    }

    #[test]
    fn silent_audio_channel_expires() {
        let (mut ctx, _pipeline) = audio_context();
        let t0 = Instant::now();
        let window = ctx.config.liveness_window;
        let mut state = AudioStreamingState::enter(&mut ctx, t0);
        assert_eq!(
            state.on_tick(&mut ctx, t0 + window),
            Some(Transition::Reset(ResetReason::LivenessExpired))
        );
    }
}
