use anyhow::Result;
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{load_assets, AssetCatalog};

/// Quiet period collapsing bursts of filesystem events into one rescan.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Told about assets a rescan removed or rewrote, after the new snapshot is published.
#[async_trait]
pub trait CatalogListener: Send + Sync {
    async fn assets_changed(&self, stale: &[String]);
}

/// Keeps an asset catalog in sync with its directory.
///
/// The background task spawned by [`CatalogWatcher::spawn`] is the only writer
/// of the catalog. Dropping the watcher stops filesystem notifications.
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
}

impl CatalogWatcher {
    pub fn spawn(
        catalog: Arc<AssetCatalog>,
        listener: Option<Arc<dyn CatalogListener>>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!(error = %e, "Asset watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(catalog.root(), RecursiveMode::Recursive)?;

        info!("👀 Watching {} for asset changes", catalog.root().display());
        tokio::spawn(reload_loop(catalog, listener, rx, shutdown));

        Ok(Self { _watcher: watcher })
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
    )
}

async fn reload_loop(
    catalog: Arc<AssetCatalog>,
    listener: Option<Arc<dyn CatalogListener>>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if !is_relevant(&event) {
            continue;
        }
        debug!(paths = ?event.paths, "Asset change detected");

        // Drain the rest of the burst
        loop {
            match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }

        let root = catalog.root().to_path_buf();
        match tokio::task::spawn_blocking(move || load_assets(&root)).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let previous = catalog.replace(snapshot.clone());
                let stale = previous.stale_in(&snapshot);
                let (categories, assets) = catalog.counts();
                info!(
                    root = %catalog.root().display(),
                    categories,
                    assets,
                    stale = stale.len(),
                    "🔄 Reloaded assets"
                );

                if let Some(listener) = &listener {
                    if !stale.is_empty() {
                        listener.assets_changed(&stale).await;
                    }
                }
            }
            Err(e) => error!(error = %e, "Asset rescan task failed"),
        }
    }
    debug!(root = %catalog.root().display(), "Asset watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{tests::FakeTranscoder, SoundCache};
    use std::{path::PathBuf, sync::atomic::Ordering};

    #[test]
    fn test_access_events_are_ignored() {
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/a.mp3"));
        let create = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tmp/a.mp3"));

        assert!(!is_relevant(&access));
        assert!(is_relevant(&create));
    }

    #[tokio::test]
    async fn test_reload_loop_publishes_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("greetings")).unwrap();
        let catalog = Arc::new(AssetCatalog::load(dir.path()));
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(reload_loop(catalog.clone(), None, rx, shutdown.clone()));

        std::fs::write(dir.path().join("greetings").join("bell.mp3"), b"x").unwrap();
        tx.send(
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(dir.path().join("greetings").join("bell.mp3")),
        )
        .unwrap();

        let mut found = false;
        for _ in 0..50 {
            if catalog.path_of("bell").is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(found);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rewritten_source_is_encoded_again() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("audio");
        let source = assets.join("greetings").join("bell.mp3");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"OLD").unwrap();

        let catalog = Arc::new(AssetCatalog::load(&assets));
        let transcoder = Arc::new(FakeTranscoder::default());
        let cache = Arc::new(SoundCache::new(dir.path().join("cache"), transcoder.clone()));
        cache.ensure_cached("bell", &source).await.unwrap();
        assert!(cache.is_cached("bell").await);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(reload_loop(
            catalog.clone(),
            Some(cache.clone()),
            rx,
            shutdown.clone(),
        ));

        std::fs::write(&source, b"a brand new bell").unwrap();
        tx.send(
            Event::new(EventKind::Modify(notify::event::ModifyKind::Any)).add_path(source.clone()),
        )
        .unwrap();

        let mut evicted = false;
        for _ in 0..50 {
            if !cache.is_cached("bell").await {
                evicted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(evicted);

        cache.ensure_cached("bell", &source).await.unwrap();
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        task.await.unwrap();
    }
}
