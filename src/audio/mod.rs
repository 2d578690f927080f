//! # Audio Module
//!
//! Plays short cached sounds into Discord voice channels.
//!
//! ## Architecture
//!
//! ### [`sequencer`] - Playback Sequencer
//! - Single-flight gate: one sound at a time across every guild
//! - Ensures the sound is cached, joins, streams, and always disconnects
//! - Enforces the 10 second stream deadline
//!
//! ### [`transport`] - Voice Transport
//! - [`VoiceTransport`] seam between the sequencer and the voice gateway
//! - [`SongbirdTransport`] implementation over the songbird manager
//!
//! ### [`events`] - Track Events
//! - Songbird event handler reporting track end/error to the transport
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let sequencer = PlaybackSequencer::new(cache, Arc::new(SongbirdTransport::new(songbird)));
//! let outcome = sequencer
//!     .play(PlaybackRequest {
//!         sound_name: "bell".to_string(),
//!         source: "/var/go-aku/audio/greetings/bell.mp3".into(),
//!         target,
//!     })
//!     .await;
//! ```

pub mod events;
pub mod sequencer;
pub mod transport;

use serenity::model::id::GuildId;
use thiserror::Error;

use crate::cache::CacheError;

pub use sequencer::{PlaybackOutcome, PlaybackRequest, PlaybackSequencer};
#[cfg(test)]
pub use transport::MockVoiceTransport;
pub use transport::{SongbirdTransport, VoiceTarget, VoiceTransport};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cached sound unreadable: {0}")]
    Artifact(String),

    #[error("failed to join voice: {0}")]
    Join(String),

    #[error("no active call in guild {0}")]
    NoCall(GuildId),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("failed to disconnect: {0}")]
    Disconnect(String),
}
