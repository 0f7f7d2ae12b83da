//! Icom network remote-control protocol engine for riglink.
//!
//! A networked Icom radio exposes three UDP channels (control, CI-V and
//! audio). Each channel is driven by its own [`ConnectionStateMachine`]
//! through discovery (AreYouThere, AreYouReady), login (control and CI-V
//! only) and then keepalive or audio streaming, falling back to discovery
//! whenever the link fails. This crate provides:
//!
//! - **Packet codec** ([`packet`]) -- the 16-byte header and typed payloads.
//! - **Sequence arithmetic** ([`seq`]) -- 16-bit wrap-aware ordering and the
//!   per-channel counters.
//! - **ConnectionStateMachine** ([`machine`]) -- the sans-IO per-channel
//!   engine, driven by received datagrams and timer ticks.
//! - **RemoteSession** ([`session`]) -- one tokio task per channel running
//!   the machine over a [`DatagramTransport`](riglink_core::DatagramTransport).
//! - **SessionBuilder** ([`builder`]) -- fluent builder for sessions with
//!   credentials, ports and timing overrides.
//!
//! # Example
//!
//! ```
//! use riglink_icom::packet::{self, IcomPacket, PacketType};
//!
//! let probe = IcomPacket::are_you_there(0x0000_BEEF);
//! let bytes = probe.encode();
//! assert_eq!(bytes.len(), packet::HEADER_LEN);
//!
//! let decoded = packet::decode(&bytes).unwrap();
//! assert_eq!(decoded.packet_type(), PacketType::AreYouThere);
//! assert_eq!(decoded.sender_id(), 0x0000_BEEF);
//! ```

pub mod builder;
pub mod config;
mod context;
mod discovery;
mod io;
mod keepalive;
mod login;
pub mod machine;
pub mod packet;
pub mod seq;
pub mod session;
mod state;
mod streaming;
mod tracked;

pub use builder::SessionBuilder;
pub use config::ProtocolConfig;
pub use machine::ConnectionStateMachine;
pub use packet::{IcomPacket, PacketType};
pub use session::RemoteSession;
