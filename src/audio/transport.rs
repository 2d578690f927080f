use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{input::Input, Event, Songbird, TrackEvent};
use std::{path::Path, sync::Arc};
use tokio::sync::oneshot;
use tracing::debug;

use super::{events::PlaybackNotifier, PlaybackError};

/// Voice channel a sound is played into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Audio transport towards the voice gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(&self, target: VoiceTarget) -> Result<(), PlaybackError>;

    /// Plays `artifact` in the joined call and resolves once it has ended.
    async fn stream(&self, target: VoiceTarget, artifact: &Path) -> Result<(), PlaybackError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlaybackError>;
}

/// [`VoiceTransport`] backed by the songbird voice manager.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, target: VoiceTarget) -> Result<(), PlaybackError> {
        self.manager
            .join(target.guild_id, target.channel_id)
            .await
            .map(|_| ())
            .map_err(|e| PlaybackError::Join(e.to_string()))
    }

    async fn stream(&self, target: VoiceTarget, artifact: &Path) -> Result<(), PlaybackError> {
        let call = self
            .manager
            .get(target.guild_id)
            .ok_or(PlaybackError::NoCall(target.guild_id))?;

        let (tx, rx) = oneshot::channel();
        let notifier = PlaybackNotifier::new(tx);
        {
            let mut handler = call.lock().await;
            // The call is removed after every sound, so these never pile up
            handler.add_global_event(Event::Track(TrackEvent::End), notifier.clone());
            handler.add_global_event(Event::Track(TrackEvent::Error), notifier);

            let input: Input = songbird::input::File::new(artifact.to_path_buf()).into();
            handler.play_input(input);
        }
        debug!(guild = %target.guild_id, artifact = %artifact.display(), "Streaming to voice");

        rx.await
            .map_err(|_| PlaybackError::Stream("voice driver dropped the track".to_string()))?
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| PlaybackError::Disconnect(e.to_string()))
    }
}
