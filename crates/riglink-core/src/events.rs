//! Asynchronous link event types.
//!
//! Events are emitted by channel tasks through a [`tokio::sync::broadcast`]
//! channel whenever a channel changes state. Status displays subscribe to
//! these instead of polling.

use crate::types::{Channel, ResetReason, StateKind};

/// An event emitted by a channel task.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events when a link is flapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A channel moved from one protocol state to another.
    StateChanged {
        /// Which channel changed state.
        channel: Channel,
        /// The state that was left.
        from: StateKind,
        /// The state that was entered.
        to: StateKind,
    },

    /// A channel completed its handshake (steady state or audio streaming).
    Established {
        /// Which channel is now established.
        channel: Channel,
    },

    /// A channel fell back to discovery.
    Reset {
        /// Which channel was reset.
        channel: Channel,
        /// Why it was reset.
        reason: ResetReason,
    },

    /// A channel task stopped.
    Stopped {
        /// Which channel stopped.
        channel: Channel,
    },
}
