//! riglink-test-harness: Test utilities for riglink.
//!
//! This crate provides [`MockDatagramTransport`] for deterministic testing of
//! channel tasks without a network, and [`MockAudioPipeline`] for scripting
//! and capturing PCM audio.

pub mod mock_audio;
pub mod mock_udp;

pub use mock_audio::MockAudioPipeline;
pub use mock_udp::{MockDatagramHandle, MockDatagramTransport};
