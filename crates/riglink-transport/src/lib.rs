//! Transport implementations for riglink.
//!
//! This crate provides concrete implementations of the
//! [`DatagramTransport`](riglink_core::DatagramTransport) trait from
//! `riglink-core`:
//!
//! - [`UdpTransport`]: one UDP socket per protocol channel, connected to the
//!   radio's port for that channel

pub mod udp;

pub use udp::UdpTransport;
