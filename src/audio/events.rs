use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::{
    tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::error;

use super::PlaybackError;

type Completion = oneshot::Sender<Result<(), PlaybackError>>;

/// Reports the first track end or error of a call through a oneshot.
#[derive(Clone)]
pub struct PlaybackNotifier {
    tx: Arc<Mutex<Option<Completion>>>,
}

impl PlaybackNotifier {
    pub fn new(tx: Completion) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for PlaybackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let EventContext::Track(track_list) = ctx else {
            return None;
        };

        let mut outcome = Ok(());
        for (state, _handle) in *track_list {
            if let PlayMode::Errored(e) = &state.playing {
                error!("❌ Track error: {:?}", e);
                outcome = Err(PlaybackError::Stream(format!("{e:?}")));
            }
        }

        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }

        None
    }
}
