use futures::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use super::{PlaybackError, VoiceTarget, VoiceTransport};
use crate::cache::SoundCache;

/// Hard deadline from stream start; not configurable per request.
pub const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// One sound to play into one voice channel.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    /// Cache key of the sound.
    pub sound_name: String,
    pub source: PathBuf,
    pub target: VoiceTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Another sound was already playing; nothing happened.
    Dropped,
    Completed,
    TimedOut,
    Failed,
}

/// Clears the busy flag on every exit path, unwinding included.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight playback: at most one sound streams process-wide.
///
/// Requests arriving while a sound is in flight are dropped, not queued.
pub struct PlaybackSequencer {
    cache: Arc<SoundCache>,
    transport: Arc<dyn VoiceTransport>,
    busy: AtomicBool,
    timeout: Duration,
}

impl PlaybackSequencer {
    pub fn new(cache: Arc<SoundCache>, transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            cache,
            transport,
            busy: AtomicBool::new(false),
            timeout: PLAYBACK_TIMEOUT,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Ensures the sound is cached, joins, streams with a timeout, and disconnects.
    pub async fn play(&self, request: PlaybackRequest) -> PlaybackOutcome {
        let Some(_busy) = self.try_acquire() else {
            debug!(sound = %request.sound_name, "Skipping sound because another is being played");
            return PlaybackOutcome::Dropped;
        };

        let started = Instant::now();
        let target = request.target;

        let artifact = match self.prepare(&request).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(
                    sound = %request.sound_name,
                    source = %request.source.display(),
                    error = %e,
                    "Failed to prepare cached sound"
                );
                return PlaybackOutcome::Failed;
            }
        };

        let outcome = match self.transport.join(target).await {
            Ok(()) => self.stream(&request, &artifact).await,
            Err(e) => {
                error!(
                    guild = %target.guild_id,
                    channel = %target.channel_id,
                    error = %e,
                    "Failed to join voice"
                );
                PlaybackOutcome::Failed
            }
        };

        self.disconnect(target).await;

        if outcome == PlaybackOutcome::Completed {
            debug!(
                sound = %request.sound_name,
                took = %humantime::format_duration(started.elapsed()),
                "E2E sound play time"
            );
        }
        outcome
    }

    async fn prepare(&self, request: &PlaybackRequest) -> Result<PathBuf, PlaybackError> {
        let artifact = self
            .cache
            .ensure_cached(&request.sound_name, &request.source)
            .await?;

        let file = tokio::fs::File::open(&artifact)
            .await
            .map_err(|e| PlaybackError::Artifact(e.to_string()))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| PlaybackError::Artifact(e.to_string()))?;
        if metadata.len() == 0 {
            return Err(PlaybackError::Artifact(format!(
                "{} is empty",
                artifact.display()
            )));
        }

        Ok(artifact)
    }

    async fn stream(&self, request: &PlaybackRequest, artifact: &std::path::Path) -> PlaybackOutcome {
        let target = request.target;
        let stream = AssertUnwindSafe(self.transport.stream(target, artifact)).catch_unwind();

        match tokio::time::timeout(self.timeout, stream).await {
            Err(_) => {
                warn!(
                    guild = %target.guild_id,
                    channel = %target.channel_id,
                    sound = %request.sound_name,
                    "Timed out while streaming sound to voice"
                );
                PlaybackOutcome::TimedOut
            }
            Ok(Err(_panic)) => {
                error!(sound = %request.sound_name, "Panic while streaming sound to voice");
                PlaybackOutcome::Failed
            }
            Ok(Ok(Err(e))) => {
                error!(
                    sound = %request.sound_name,
                    source = %request.source.display(),
                    error = %e,
                    "Streaming cached sound failed"
                );
                PlaybackOutcome::Failed
            }
            Ok(Ok(Ok(()))) => PlaybackOutcome::Completed,
        }
    }

    async fn disconnect(&self, target: VoiceTarget) {
        match self.transport.disconnect(target.guild_id).await {
            Ok(()) => info!(
                guild = %target.guild_id,
                channel = %target.channel_id,
                "Disconnected from voice"
            ),
            Err(e) => error!(
                guild = %target.guild_id,
                channel = %target.channel_id,
                error = %e,
                "Failed to disconnect from voice"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::MockVoiceTransport,
        cache::tests::FakeTranscoder,
    };
    use async_trait::async_trait;
    use serenity::model::id::{ChannelId, GuildId};
    use std::{path::Path, sync::atomic::AtomicUsize};
    use tokio::sync::Notify;

    fn target() -> VoiceTarget {
        VoiceTarget {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(10),
        }
    }

    fn request(dir: &Path, name: &str) -> PlaybackRequest {
        PlaybackRequest {
            sound_name: name.to_string(),
            source: dir.join(format!("{name}.mp3")),
            target: target(),
        }
    }

    enum StreamMode {
        /// Waits for `release` before completing.
        Gated,
        Hang,
        Panic,
    }

    struct RecordingTransport {
        joins: AtomicUsize,
        disconnects: AtomicUsize,
        mode: StreamMode,
        release: Notify,
    }

    impl RecordingTransport {
        fn new(mode: StreamMode) -> Self {
            Self {
                joins: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                mode,
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl VoiceTransport for RecordingTransport {
        async fn join(&self, _target: VoiceTarget) -> Result<(), PlaybackError> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stream(&self, _target: VoiceTarget, _artifact: &Path) -> Result<(), PlaybackError> {
            match self.mode {
                StreamMode::Gated => {
                    self.release.notified().await;
                    Ok(())
                }
                StreamMode::Hang => std::future::pending().await,
                StreamMode::Panic => panic!("voice driver blew up"),
            }
        }

        async fn disconnect(&self, _guild_id: GuildId) -> Result<(), PlaybackError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sequencer_with(
        dir: &Path,
        transport: Arc<dyn VoiceTransport>,
    ) -> (Arc<PlaybackSequencer>, Arc<FakeTranscoder>) {
        let transcoder = Arc::new(FakeTranscoder::default());
        let cache = Arc::new(SoundCache::new(dir.join("cache"), transcoder.clone()));
        (Arc::new(PlaybackSequencer::new(cache, transport)), transcoder)
    }

    #[tokio::test]
    async fn test_busy_sequencer_drops_second_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(StreamMode::Gated));
        let (sequencer, transcoder) = sequencer_with(dir.path(), transport.clone());

        let first = tokio::spawn({
            let sequencer = sequencer.clone();
            let request = request(dir.path(), "bell");
            async move { sequencer.play(request).await }
        });
        while transport.joins.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(sequencer.is_busy());

        let second = sequencer.play(request(dir.path(), "horn")).await;
        assert_eq!(second, PlaybackOutcome::Dropped);
        assert_eq!(transport.joins.load(Ordering::SeqCst), 1);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
        assert!(!sequencer.cache.is_cached("horn").await);

        transport.release.notify_one();
        assert_eq!(first.await.unwrap(), PlaybackOutcome::Completed);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!sequencer.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_times_out_and_still_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(StreamMode::Hang));
        let (sequencer, _) = sequencer_with(dir.path(), transport.clone());

        let outcome = sequencer.play(request(dir.path(), "bell")).await;

        assert_eq!(outcome, PlaybackOutcome::TimedOut);
        assert_eq!(transport.joins.load(Ordering::SeqCst), 1);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!sequencer.is_busy());
    }

    #[tokio::test]
    async fn test_stream_panic_releases_flag() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(StreamMode::Panic));
        let (sequencer, _) = sequencer_with(dir.path(), transport.clone());

        let outcome = sequencer.play(request(dir.path(), "bell")).await;

        assert_eq!(outcome, PlaybackOutcome::Failed);
        assert_eq!(transport.joins.load(Ordering::SeqCst), 1);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!sequencer.is_busy());
    }

    #[tokio::test]
    async fn test_join_failure_still_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockVoiceTransport::new();
        transport
            .expect_join()
            .times(1)
            .returning(|_| Err(PlaybackError::Join("missing permissions".to_string())));
        transport.expect_stream().times(0);
        transport.expect_disconnect().times(1).returning(|_| Ok(()));
        let (sequencer, _) = sequencer_with(dir.path(), Arc::new(transport));

        let outcome = sequencer.play(request(dir.path(), "bell")).await;

        assert_eq!(outcome, PlaybackOutcome::Failed);
        assert!(!sequencer.is_busy());
    }

    #[tokio::test]
    async fn test_stream_error_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockVoiceTransport::new();
        transport.expect_join().times(1).returning(|_| Ok(()));
        transport
            .expect_stream()
            .times(1)
            .returning(|_, _| Err(PlaybackError::Stream("decoder error".to_string())));
        transport
            .expect_disconnect()
            .times(1)
            .returning(|_| Err(PlaybackError::Disconnect("no call".to_string())));
        let (sequencer, _) = sequencer_with(dir.path(), Arc::new(transport));

        let outcome = sequencer.play(request(dir.path(), "bell")).await;

        assert_eq!(outcome, PlaybackOutcome::Failed);
    }

    #[tokio::test]
    async fn test_cache_failure_never_joins_and_releases_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockVoiceTransport::new();
        transport.expect_join().times(1).returning(|_| Ok(()));
        transport.expect_stream().times(1).returning(|_, _| Ok(()));
        transport.expect_disconnect().times(1).returning(|_| Ok(()));
        let (sequencer, transcoder) = sequencer_with(dir.path(), Arc::new(transport));

        let failed = sequencer.play(request(dir.path(), "broken")).await;
        assert_eq!(failed, PlaybackOutcome::Failed);
        assert!(!sequencer.is_busy());

        let played = sequencer.play(request(dir.path(), "bell")).await;
        assert_eq!(played, PlaybackOutcome::Completed);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 2);
    }
}
