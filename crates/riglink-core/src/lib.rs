//! riglink-core: Core traits, types, and error definitions for riglink.
//!
//! This crate defines the protocol-agnostic pieces shared by the Icom
//! network engine, the transports and applications: the datagram
//! transport seam, the audio pipeline seam, channel status types and link
//! events.
//!
//! # Key types
//!
//! - [`DatagramTransport`] -- the socket carrying one logical channel
//! - [`AudioPipeline`] -- where outbound PCM comes from and inbound PCM goes
//! - [`ChannelStatus`] / [`LinkEvent`] -- liveness reporting
//! - [`Error`] / [`Result`] -- error handling

pub mod audio;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use riglink_core::*`.
pub use audio::{
    AudioPipeline, AudioReceiver, AudioSender, AudioStreamConfig, ChannelAudioPipeline, PcmBlock,
};
pub use error::{Error, Result};
pub use events::LinkEvent;
pub use transport::DatagramTransport;
pub use types::*;
