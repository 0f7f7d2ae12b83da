//! Core types shared by the protocol engine, the transports and callers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One logical connection to the radio.
///
/// Each channel runs its own state machine with its own socket,
/// identifiers and sequence space. Control and CI-V share the same
/// handshake shape (discovery then login); Audio skips login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Session control channel.
    Control,
    /// CI-V command channel.
    Civ,
    /// Bidirectional PCM audio channel.
    Audio,
}

impl Channel {
    /// All channels, in the order a session starts them.
    pub const ALL: [Channel; 3] = [Channel::Control, Channel::Civ, Channel::Audio];

    /// The radio's factory-default UDP port for this channel.
    pub fn default_port(&self) -> u16 {
        match self {
            Channel::Control => 50001,
            Channel::Civ => 50002,
            Channel::Audio => 50003,
        }
    }

    /// Whether the channel authenticates after discovery.
    pub fn requires_login(&self) -> bool {
        !matches!(self, Channel::Audio)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Control => "control",
            Channel::Civ => "civ",
            Channel::Audio => "audio",
        };
        write!(f, "{s}")
    }
}

/// Error returned when parsing a [`Channel`] from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelError(String);

impl fmt::Display for ParseChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel: {}", self.0)
    }
}

impl std::error::Error for ParseChannelError {}

impl FromStr for Channel {
    type Err = ParseChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "control" => Ok(Channel::Control),
            "civ" | "ci-v" => Ok(Channel::Civ),
            "audio" => Ok(Channel::Audio),
            _ => Err(ParseChannelError(s.to_string())),
        }
    }
}

/// Which protocol state a channel is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Probing the radio until it answers.
    AreYouThere,
    /// Waiting for the radio to report ready (control / CI-V).
    AreYouReady,
    /// Waiting for the radio to report ready (audio).
    AreYouReadyAudio,
    /// Authenticating.
    Login,
    /// Authenticated; command traffic may flow.
    SteadyState,
    /// Streaming audio.
    Audio,
}

impl StateKind {
    /// Whether the channel has completed its handshake.
    pub fn is_established(&self) -> bool {
        matches!(self, StateKind::SteadyState | StateKind::Audio)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateKind::AreYouThere => "AreYouThere",
            StateKind::AreYouReady => "AreYouReady",
            StateKind::AreYouReadyAudio => "AreYouReadyAudio",
            StateKind::Login => "Login",
            StateKind::SteadyState => "SteadyState",
            StateKind::Audio => "Audio",
        };
        write!(f, "{s}")
    }
}

/// Why a channel fell back to discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetReason {
    /// The channel was (re)started by the caller.
    Started,
    /// A discovery state resent its probe too many times.
    HandshakeTimeout,
    /// A tracked packet exhausted its retries.
    DeliveryFailure,
    /// The radio rejected our credentials.
    AuthenticationFailed,
    /// No inbound traffic within the liveness window.
    LivenessExpired,
    /// The socket reported an error or disconnect.
    TransportDisconnect,
    /// The radio sent a disconnect packet.
    RemoteDisconnect,
}

impl ResetReason {
    /// Whether the reset is a failure (as opposed to a caller-requested start).
    pub fn is_failure(&self) -> bool {
        !matches!(self, ResetReason::Started)
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResetReason::Started => "started",
            ResetReason::HandshakeTimeout => "handshake timeout",
            ResetReason::DeliveryFailure => "delivery failure",
            ResetReason::AuthenticationFailed => "authentication failed",
            ResetReason::LivenessExpired => "liveness window expired",
            ResetReason::TransportDisconnect => "transport disconnect",
            ResetReason::RemoteDisconnect => "remote disconnect",
        };
        write!(f, "{s}")
    }
}

/// Username and password for the radio's network login.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    /// Network user name configured on the radio.
    pub username: String,
    /// Network password configured on the radio.
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Snapshot of one channel's liveness and progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Which channel this is.
    pub channel: Channel,
    /// Current protocol state.
    pub state: StateKind,
    /// The radio's identifier is known.
    pub bound: bool,
    /// Login succeeded and the channel is in steady state.
    pub authenticated: bool,
    /// The channel's last reset was a failure and it has not re-established.
    pub dead: bool,
    /// The radio's identifier for this channel, once bound.
    pub their_identifier: Option<u32>,
    /// Session token from a successful login.
    pub token: Option<u32>,
    /// Most recent ping round-trip time.
    pub round_trip: Option<Duration>,
    /// Number of times the channel has fallen back to discovery.
    pub resets: u32,
    /// Number of tracked-packet retransmissions.
    pub retransmits: u64,
    /// Inbound audio frames dropped as stale or duplicate.
    pub audio_dropped: u64,
}

impl ChannelStatus {
    /// A fresh status for a channel that has not been started.
    pub fn new(channel: Channel) -> Self {
        ChannelStatus {
            channel,
            state: StateKind::AreYouThere,
            bound: false,
            authenticated: false,
            dead: false,
            their_identifier: None,
            token: None,
            round_trip: None,
            resets: 0,
            retransmits: 0,
            audio_dropped: 0,
        }
    }
}
