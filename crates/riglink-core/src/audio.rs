//! Audio pipeline types and the [`AudioPipeline`] trait.
//!
//! The protocol engine does not capture or play audio itself. It pulls
//! outbound PCM blocks from, and pushes inbound PCM blocks to, an
//! [`AudioPipeline`] supplied by the application.
//!
//! # Channel-based pipeline
//!
//! [`ChannelAudioPipeline`] bridges the engine's synchronous pipeline calls
//! to the async world through bounded [`tokio::sync::mpsc`] channels:
//!
//! - **TX audio** (to radio): the application pushes [`PcmBlock`]s via
//!   [`AudioSender::send()`]; the audio channel drains one block per frame
//!   tick.
//! - **RX audio** (from radio): the audio channel pushes accepted blocks;
//!   the application reads them via [`AudioReceiver::recv()`]. If the
//!   application falls behind, blocks are dropped rather than queued
//!   without bound.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// AudioStreamConfig
// ---------------------------------------------------------------------------

/// Format of the PCM audio exchanged with the radio.
///
/// Samples on the wire are always signed 16-bit little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamConfig {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono).
    pub channels: u16,
}

impl AudioStreamConfig {
    /// Number of interleaved samples covering `interval`.
    pub fn samples_per(&self, interval: Duration) -> usize {
        let frames = self.sample_rate as u128 * interval.as_micros() / 1_000_000;
        frames as usize * self.channels as usize
    }
}

impl Default for AudioStreamConfig {
    /// 8 kHz mono, the format used by digital-voice modems.
    fn default() -> Self {
        AudioStreamConfig {
            sample_rate: 8000,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// PcmBlock
// ---------------------------------------------------------------------------

/// A block of interleaved signed 16-bit PCM samples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmBlock {
    /// Interleaved samples.
    pub samples: Vec<i16>,
}

impl PcmBlock {
    /// Wrap a sample vector.
    pub fn new(samples: Vec<i16>) -> Self {
        PcmBlock { samples }
    }

    /// Decode little-endian sample bytes. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        PcmBlock { samples }
    }

    /// Encode the samples as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this block in the given format.
    pub fn duration(&self, config: &AudioStreamConfig) -> Duration {
        if config.sample_rate == 0 || config.channels == 0 {
            return Duration::ZERO;
        }
        let frames = (self.samples.len() / config.channels as usize) as u64;
        Duration::from_micros(frames * 1_000_000 / config.sample_rate as u64)
    }
}

// ---------------------------------------------------------------------------
// AudioPipeline
// ---------------------------------------------------------------------------

/// The audio collaborator consumed by the audio channel.
///
/// Both calls are made from the channel's task and must not block.
pub trait AudioPipeline: Send {
    /// Take the next outbound block, if one is buffered.
    fn pull_next_block(&mut self) -> Option<PcmBlock>;

    /// Hand over an accepted inbound block.
    fn push_received_block(&mut self, block: PcmBlock);
}

// ---------------------------------------------------------------------------
// AudioReceiver / AudioSender
// ---------------------------------------------------------------------------

/// Receives PCM blocks from the radio's audio stream.
///
/// The stream ends when the audio channel's pipeline is dropped, at which
/// point [`recv()`](AudioReceiver::recv) returns `None`.
pub struct AudioReceiver {
    rx: mpsc::Receiver<PcmBlock>,
    config: AudioStreamConfig,
}

impl AudioReceiver {
    /// Create a new `AudioReceiver` wrapping an mpsc receiver.
    pub fn new(rx: mpsc::Receiver<PcmBlock>, config: AudioStreamConfig) -> Self {
        AudioReceiver { rx, config }
    }

    /// Receive the next block. Returns `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<PcmBlock> {
        self.rx.recv().await
    }

    /// Get the audio stream configuration.
    pub fn config(&self) -> &AudioStreamConfig {
        &self.config
    }
}

/// Sends PCM blocks to the radio's audio stream.
///
/// The channel is bounded; if the audio channel is not draining fast
/// enough, [`send()`](AudioSender::send) waits for space.
pub struct AudioSender {
    tx: mpsc::Sender<PcmBlock>,
    config: AudioStreamConfig,
}

impl AudioSender {
    /// Create a new `AudioSender` wrapping an mpsc sender.
    pub fn new(tx: mpsc::Sender<PcmBlock>, config: AudioStreamConfig) -> Self {
        AudioSender { tx, config }
    }

    /// Queue a block for transmission.
    ///
    /// Returns [`Error::StreamClosed`] if the pipeline has been dropped.
    pub async fn send(&self, block: PcmBlock) -> Result<()> {
        self.tx.send(block).await.map_err(|_| Error::StreamClosed)
    }

    /// Get the audio stream configuration.
    pub fn config(&self) -> &AudioStreamConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// ChannelAudioPipeline
// ---------------------------------------------------------------------------

/// An [`AudioPipeline`] backed by two bounded mpsc channels.
pub struct ChannelAudioPipeline {
    outbound: mpsc::Receiver<PcmBlock>,
    inbound: mpsc::Sender<PcmBlock>,
    dropped: u64,
}

impl ChannelAudioPipeline {
    /// Create a pipeline plus the application-side sender and receiver.
    ///
    /// `capacity` bounds each direction, in blocks.
    pub fn new(
        config: AudioStreamConfig,
        capacity: usize,
    ) -> (ChannelAudioPipeline, AudioSender, AudioReceiver) {
        let (tx_out, rx_out) = mpsc::channel(capacity);
        let (tx_in, rx_in) = mpsc::channel(capacity);
        let pipeline = ChannelAudioPipeline {
            outbound: rx_out,
            inbound: tx_in,
            dropped: 0,
        };
        (
            pipeline,
            AudioSender::new(tx_out, config),
            AudioReceiver::new(rx_in, config),
        )
    }

    /// Inbound blocks dropped because the application was not reading.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl AudioPipeline for ChannelAudioPipeline {
    fn pull_next_block(&mut self) -> Option<PcmBlock> {
        self.outbound.try_recv().ok()
    }

    fn push_received_block(&mut self, block: PcmBlock) {
        if self.inbound.try_send(block).is_err() {
            self.dropped += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
