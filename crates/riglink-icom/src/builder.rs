//! SessionBuilder -- fluent builder for constructing [`RemoteSession`]s.
//!
//! Separates configuration from construction so that callers can set up
//! credentials, channel ports, timing overrides and the audio pipeline
//! before any socket is bound.
//!
//! # Example
//!
//! ```no_run
//! use riglink_icom::builder::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> riglink_core::Result<()> {
//! let session = SessionBuilder::new("192.168.1.50")
//!     .credentials("w1aw", "hunter2")
//!     .retransmit_interval(Duration::from_millis(150))
//!     .build()
//!     .await?;
//! session.wait_established(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;

use riglink_core::audio::AudioPipeline;
use riglink_core::error::{Error, Result};
use riglink_core::transport::DatagramTransport;
use riglink_core::types::{Channel, Credentials};
use riglink_transport::UdpTransport;

use crate::config::ProtocolConfig;
use crate::machine::ConnectionStateMachine;
use crate::packet::LOGIN_FIELD_LEN;
use crate::session::RemoteSession;

const EVENT_CAPACITY: usize = 64;

/// Fluent builder for [`RemoteSession`].
///
/// Everything except the host has a default, so the simplest usage is:
///
/// ```ignore
/// let session = SessionBuilder::new("192.168.1.50")
///     .credentials("user", "pass")
///     .build()
///     .await?;
/// ```
pub struct SessionBuilder {
    host: String,
    credentials: Credentials,
    client_name: String,
    control_port: u16,
    civ_port: u16,
    audio_port: u16,
    config: ProtocolConfig,
    audio: Option<Box<dyn AudioPipeline>>,
    channels: Vec<Channel>,
    our_identifier: Option<u32>,
}

impl SessionBuilder {
    /// Create a new builder for the radio at `host` (name or address).
    pub fn new(host: &str) -> Self {
        SessionBuilder {
            host: host.to_string(),
            credentials: Credentials::default(),
            client_name: "riglink".to_string(),
            control_port: Channel::Control.default_port(),
            civ_port: Channel::Civ.default_port(),
            audio_port: Channel::Audio.default_port(),
            config: ProtocolConfig::default(),
            audio: None,
            channels: Channel::ALL.to_vec(),
            our_identifier: None,
        }
    }

    /// Set the network user name and password configured on the radio.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Set the name this client announces at login (default: `riglink`).
    pub fn client_name(mut self, name: &str) -> Self {
        self.client_name = name.to_string();
        self
    }

    /// Override the control channel port (default: 50001).
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Override the CI-V channel port (default: 50002).
    pub fn civ_port(mut self, port: u16) -> Self {
        self.civ_port = port;
        self
    }

    /// Override the audio channel port (default: 50003).
    pub fn audio_port(mut self, port: u16) -> Self {
        self.audio_port = port;
        self
    }

    /// Replace every timing constant at once.
    pub fn protocol_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the AreYouThere / AreYouReady resend period (default: 500ms).
    pub fn handshake_interval(mut self, interval: Duration) -> Self {
        self.config.handshake_interval = interval;
        self
    }

    /// Set how many probes a discovery state sends before the channel
    /// resets (default: 10).
    pub fn handshake_max_attempts(mut self, attempts: u32) -> Self {
        self.config.handshake_max_attempts = attempts;
        self
    }

    /// Set the tracked-packet retransmit period (default: 200ms).
    pub fn retransmit_interval(mut self, interval: Duration) -> Self {
        self.config.retransmit_interval = interval;
        self
    }

    /// Set the retry ceiling for tracked packets (default: 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Set the keepalive ping period (default: 500ms).
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Set how long an established channel may stay silent before it is
    /// declared dead (default: 2s).
    pub fn liveness_window(mut self, window: Duration) -> Self {
        self.config.liveness_window = window;
        self
    }

    /// Set the outbound audio frame cadence (default: 20ms).
    pub fn audio_frame_interval(mut self, interval: Duration) -> Self {
        self.config.audio_frame_interval = interval;
        self
    }

    /// Attach the pipeline the audio channel pulls from and pushes to.
    ///
    /// Without one the audio channel still handshakes and keeps itself
    /// alive, but sends no frames and discards received ones.
    pub fn audio_pipeline(mut self, pipeline: impl AudioPipeline + 'static) -> Self {
        self.audio = Some(Box::new(pipeline));
        self
    }

    /// Choose which channels [`build()`](SessionBuilder::build) opens
    /// (default: all three).
    pub fn channels(mut self, channels: &[Channel]) -> Self {
        self.channels = channels.to_vec();
        self
    }

    /// Fix the identifier this client announces instead of picking a
    /// random one.
    pub fn our_identifier(mut self, id: u32) -> Self {
        self.our_identifier = Some(id);
        self
    }

    fn port(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Control => self.control_port,
            Channel::Civ => self.civ_port,
            Channel::Audio => self.audio_port,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("host must not be empty".into()));
        }
        let fields = [
            ("username", &self.credentials.username),
            ("password", &self.credentials.password),
            ("client name", &self.client_name),
        ];
        for (name, value) in fields {
            if value.len() > LOGIN_FIELD_LEN {
                return Err(Error::InvalidParameter(format!(
                    "{name} longer than {LOGIN_FIELD_LEN} bytes"
                )));
            }
        }

        let cfg = &self.config;
        let intervals = [
            ("handshake_interval", cfg.handshake_interval),
            ("retransmit_interval", cfg.retransmit_interval),
            ("ping_interval", cfg.ping_interval),
            ("liveness_window", cfg.liveness_window),
            ("audio_frame_interval", cfg.audio_frame_interval),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(Error::InvalidParameter(format!("{name} must be non-zero")));
            }
        }
        if cfg.max_retries == 0 {
            return Err(Error::InvalidParameter("max_retries must be at least 1".into()));
        }
        if cfg.handshake_max_attempts == 0 {
            return Err(Error::InvalidParameter(
                "handshake_max_attempts must be at least 1".into(),
            ));
        }
        if self.our_identifier == Some(0) {
            return Err(Error::InvalidParameter("our_identifier must be non-zero".into()));
        }
        Ok(())
    }

    async fn resolve(&self, channel: Channel) -> Result<SocketAddr> {
        let port = self.port(channel);
        tokio::net::lookup_host((self.host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| {
                Error::InvalidParameter(format!("{} did not resolve to an address", self.host))
            })
    }

    /// Build a [`RemoteSession`], binding one UDP socket per channel.
    pub async fn build(self) -> Result<RemoteSession> {
        self.validate()?;
        if self.channels.is_empty() {
            return Err(Error::InvalidParameter("no channels selected".into()));
        }

        let mut transports: Vec<(Channel, Box<dyn DatagramTransport>)> = Vec::new();
        for &channel in &self.channels {
            let remote = self.resolve(channel).await?;
            let local = if remote.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
            let transport = UdpTransport::bind(local).await?;
            transports.push((channel, Box::new(transport)));
        }
        self.build_with_transports(transports).await
    }

    /// Build a [`RemoteSession`] over caller-provided transports.
    ///
    /// This is the entry point for testing (pass `MockDatagramTransport`s
    /// from `riglink-test-harness`) and for callers that manage their own
    /// sockets. Each transport is connected to its channel's endpoint on
    /// the configured host.
    pub async fn build_with_transports(
        mut self,
        transports: Vec<(Channel, Box<dyn DatagramTransport>)>,
    ) -> Result<RemoteSession> {
        self.validate()?;
        if transports.is_empty() {
            return Err(Error::InvalidParameter("no channels selected".into()));
        }

        let our_identifier = self
            .our_identifier
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=u32::MAX));
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let mut session = RemoteSession::new(our_identifier, event_tx);

        for (channel, transport) in transports {
            let endpoint = self.resolve(channel).await?;
            let mut machine = ConnectionStateMachine::new(
                channel,
                our_identifier,
                self.config.clone(),
                self.credentials.clone(),
                self.client_name.clone(),
            );
            if channel == Channel::Audio {
                if let Some(audio) = self.audio.take() {
                    machine = machine.with_audio_pipeline(audio);
                }
            }
            session.add_channel(transport, machine, endpoint).await?;
        }

        tracing::info!(
            host = %self.host,
            our_id = our_identifier,
            channels = ?session.channels(),
            "session started"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riglink_test_harness::MockDatagramTransport;

    fn mock(channel: Channel) -> (Channel, Box<dyn DatagramTransport>) {
        let (transport, _handle) = MockDatagramTransport::new();
        (channel, Box::new(transport))
    }

    #[test]
    fn defaults() {
        let b = SessionBuilder::new("radio.local");
        assert_eq!(b.port(Channel::Control), 50001);
        assert_eq!(b.port(Channel::Civ), 50002);
        assert_eq!(b.port(Channel::Audio), 50003);
        assert_eq!(b.config, ProtocolConfig::default());
        assert_eq!(b.channels, Channel::ALL.to_vec());
        assert_eq!(b.client_name, "riglink");
        assert!(b.our_identifier.is_none());
        assert!(b.validate().is_ok());
    }

    #[test]
    fn timing_overrides_land_in_config() {
        let b = SessionBuilder::new("radio.local")
            .handshake_interval(Duration::from_millis(250))
            .handshake_max_attempts(4)
            .retransmit_interval(Duration::from_millis(100))
            .max_retries(5)
            .ping_interval(Duration::from_secs(1))
            .liveness_window(Duration::from_secs(6))
            .audio_frame_interval(Duration::from_millis(10));
        assert_eq!(
            b.config,
            ProtocolConfig {
                handshake_interval: Duration::from_millis(250),
                handshake_max_attempts: 4,
                retransmit_interval: Duration::from_millis(100),
                max_retries: 5,
                ping_interval: Duration::from_secs(1),
                liveness_window: Duration::from_secs(6),
                audio_frame_interval: Duration::from_millis(10),
            }
        );
    }

    #[test]
    fn rejects_empty_host() {
        let err = SessionBuilder::new("  ").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn rejects_long_login_fields() {
        let long = "x".repeat(LOGIN_FIELD_LEN + 1);
        let exact = "y".repeat(LOGIN_FIELD_LEN);

        assert!(SessionBuilder::new("h").credentials(&exact, &exact).validate().is_ok());
        for b in [
            SessionBuilder::new("h").credentials(&long, "p"),
            SessionBuilder::new("h").credentials("u", &long),
            SessionBuilder::new("h").client_name(&long),
        ] {
            assert!(matches!(b.validate(), Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn rejects_degenerate_timing() {
        for b in [
            SessionBuilder::new("h").retransmit_interval(Duration::ZERO),
            SessionBuilder::new("h").ping_interval(Duration::ZERO),
            SessionBuilder::new("h").max_retries(0),
            SessionBuilder::new("h").handshake_max_attempts(0),
            SessionBuilder::new("h").our_identifier(0),
        ] {
            assert!(matches!(b.validate(), Err(Error::InvalidParameter(_))));
        }
    }

    #[tokio::test]
    async fn build_rejects_empty_channel_list() {
        let result = SessionBuilder::new("127.0.0.1").channels(&[]).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = SessionBuilder::new("127.0.0.1").build_with_transports(Vec::new()).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn duplicate_channel_is_rejected() {
        let result = SessionBuilder::new("127.0.0.1")
            .build_with_transports(vec![mock(Channel::Civ), mock(Channel::Civ)])
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn random_identifier_is_non_zero() {
        let session = SessionBuilder::new("127.0.0.1")
            .build_with_transports(vec![mock(Channel::Control)])
            .await
            .unwrap();
        assert_ne!(session.our_identifier(), 0);
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn fixed_identifier_and_ports_are_used() {
        let (control, handle) = MockDatagramTransport::new();
        let session = SessionBuilder::new("127.0.0.1")
            .our_identifier(0x0102_0304)
            .control_port(6001)
            .build_with_transports(vec![(Channel::Control, Box::new(control) as Box<dyn DatagramTransport>)])
            .await
            .unwrap();
        assert_eq!(session.our_identifier(), 0x0102_0304);
        assert_eq!(handle.remote(), Some("127.0.0.1:6001".parse().unwrap()));
        session.stop().await.unwrap();
    }
}
