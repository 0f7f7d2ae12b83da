//! Protocol timing configuration.

use std::time::Duration;

/// Tuned timing constants for one channel.
///
/// The defaults suit a LAN with round-trip times in the tens of
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Resend period for AreYouThere / AreYouReady probes.
    pub handshake_interval: Duration,
    /// Probes sent by one discovery state before the channel resets.
    pub handshake_max_attempts: u32,
    /// Age at which an unacknowledged tracked packet is retransmitted.
    pub retransmit_interval: Duration,
    /// Retry ceiling for tracked packets.
    pub max_retries: u32,
    /// KeepAlive ping period.
    pub ping_interval: Duration,
    /// Silence on an established channel before it is declared dead.
    pub liveness_window: Duration,
    /// Outbound audio frame cadence.
    pub audio_frame_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            handshake_interval: Duration::from_millis(500),
            handshake_max_attempts: 10,
            retransmit_interval: Duration::from_millis(200),
            max_retries: 3,
            ping_interval: Duration::from_millis(500),
            liveness_window: Duration::from_secs(2),
            audio_frame_interval: Duration::from_millis(20),
        }
    }
}
