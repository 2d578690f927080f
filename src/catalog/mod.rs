//! # Catalog Module
//!
//! Name → path tables for the audio and sticker asset trees.
//!
//! An asset root contains one subdirectory per category and one file per
//! asset inside it. The asset name is the file stem with spaces replaced by
//! underscores, which is also how chat commands normalize their argument.
//!
//! Readers take cheap copies out of the current [`CatalogSnapshot`]; the
//! [`watcher`] task is the only writer and swaps whole snapshots.

pub mod watcher;

use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use tracing::{debug, error};

pub use watcher::{CatalogListener, CatalogWatcher};

/// Replaces spaces with underscores so file names and command arguments meet.
pub fn normalize_asset_name(raw: &str) -> String {
    raw.trim().replace(' ', "_")
}

/// What a rescan compares to tell an edited asset file from an untouched one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(metadata) => Self {
                modified: metadata.modified().ok(),
                len: metadata.len(),
            },
            Err(_) => Self::default(),
        }
    }
}

/// One immutable scan of an asset root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    assets: HashMap<String, PathBuf>,
    categories: HashMap<String, Vec<String>>,
    fingerprints: HashMap<String, Fingerprint>,
}

impl CatalogSnapshot {
    /// Sorted names that were removed, moved or rewritten in `next`.
    ///
    /// Names new in `next` are not listed: nothing can be derived from them yet.
    pub fn stale_in(&self, next: &CatalogSnapshot) -> Vec<String> {
        let mut stale: Vec<String> = self
            .assets
            .iter()
            .filter(|(name, path)| {
                next.assets.get(*name) != Some(*path)
                    || next.fingerprints.get(*name) != self.fingerprints.get(*name)
            })
            .map(|(name, _)| name.clone())
            .collect();
        stale.sort();
        stale
    }
}

/// Scans `root` into a snapshot.
///
/// An unreadable root yields an empty snapshot; an unreadable category is
/// skipped. Both are logged, neither is fatal.
pub fn load_assets(root: &Path) -> CatalogSnapshot {
    let mut snapshot = CatalogSnapshot::default();

    let categories = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            error!(path = %root.display(), error = %e, "Error reading categories");
            return snapshot;
        }
    };

    for category in categories.flatten() {
        let category_path = category.path();
        if !category_path.is_dir() {
            continue;
        }
        let category_name = category.file_name().to_string_lossy().into_owned();

        let assets = match std::fs::read_dir(&category_path) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    path = %category_path.display(),
                    error = %e,
                    "Error reading assets from category"
                );
                continue;
            }
        };

        let names = snapshot.categories.entry(category_name).or_default();
        for asset in assets.flatten() {
            let asset_path = asset.path();
            if asset_path.is_dir() {
                continue;
            }
            let Some(stem) = asset_path.file_stem() else {
                continue;
            };
            let name = normalize_asset_name(&stem.to_string_lossy());
            names.push(name.clone());
            snapshot
                .fingerprints
                .insert(name.clone(), Fingerprint::of(&asset_path));
            snapshot.assets.insert(name, asset_path);
        }
        names.sort();
    }

    debug!(
        path = %root.display(),
        categories = snapshot.categories.len(),
        assets = snapshot.assets.len(),
        "Scanned asset root"
    );
    snapshot
}

/// Shared, swappable view of one asset root.
#[derive(Debug)]
pub struct AssetCatalog {
    root: PathBuf,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl AssetCatalog {
    /// Scans `root` once and wraps the result.
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let snapshot = load_assets(&root);
        Self::from_snapshot(root, snapshot)
    }

    pub fn from_snapshot(root: impl Into<PathBuf>, snapshot: CatalogSnapshot) -> Self {
        Self {
            root: root.into(),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publishes a fresh scan, returning the one it superseded.
    pub fn replace(&self, snapshot: Arc<CatalogSnapshot>) -> Arc<CatalogSnapshot> {
        std::mem::replace(&mut *self.current.write(), snapshot)
    }

    /// Path of an asset in any category.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.current.read().assets.get(name).cloned()
    }

    /// Path of an asset only if it belongs to `category`.
    pub fn entry(&self, category: &str, name: &str) -> Option<PathBuf> {
        let snapshot = self.current.read();
        let listed = snapshot
            .categories
            .get(category)
            .is_some_and(|names| names.binary_search_by(|n| n.as_str().cmp(name)).is_ok());
        if listed {
            snapshot.assets.get(name).cloned()
        } else {
            None
        }
    }

    /// Sorted asset names of one category.
    pub fn category(&self, name: &str) -> Option<Vec<String>> {
        self.current.read().categories.get(name).cloned()
    }

    /// Sorted category names.
    pub fn category_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.current.read().categories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted (name, path) pairs of one category.
    pub fn category_entries(&self, name: &str) -> Vec<(String, PathBuf)> {
        let snapshot = self.current.read();
        snapshot
            .categories
            .get(name)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| snapshot.assets.get(n).map(|p| (n.clone(), p.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// (categories, assets)
    pub fn counts(&self) -> (usize, usize) {
        let snapshot = self.current.read();
        (snapshot.categories.len(), snapshot.assets.len())
    }
}
