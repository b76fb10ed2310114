use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::UNIX_EPOCH;

use log::{debug, warn};

use crate::error::AssetError;
use crate::logging::EventLog;
use crate::models::{Asset, AssetMeta, CacheStatus};
use crate::playlist::store::storage_name;
use crate::sync::lock;

/// Where assets come from
pub trait AssetSource: Send + Sync {
    /// Current metadata for `path` without transferring it
    fn probe(&self, path: &str) -> Result<AssetMeta, AssetError>;

    /// Copy `path` to `dest` and return the metadata of what was copied
    fn fetch(&self, path: &str, dest: &Path) -> Result<AssetMeta, AssetError>;
}

/// Assets served from a local directory; the etag is derived from the
/// file size and modification time.
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(AssetError::NotFound { path: path.to_string() });
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for FileAssetSource {
    fn probe(&self, path: &str) -> Result<AssetMeta, AssetError> {
        let full = self.resolve(path)?;
        let metadata = match fs::metadata(&full) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(AssetError::NotFound { path: path.to_string() }),
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_nanos())
            .unwrap_or(0);
        Ok(AssetMeta {
            etag: format!("{:x}-{:x}", metadata.len(), modified),
        })
    }

    fn fetch(&self, path: &str, dest: &Path) -> Result<AssetMeta, AssetError> {
        let meta = self.probe(path)?;
        fs::copy(self.resolve(path)?, dest)?;
        Ok(meta)
    }
}

enum Slot {
    Ready(Arc<Asset>),
    Fetching,
}

/// Clears a `Fetching` slot if the fetch unwinds, so waiters are not
/// left blocked.
struct FetchClaim<'a> {
    cache: &'a AssetCache,
    path: &'a str,
    done: bool,
}

impl FetchClaim<'_> {
    fn publish(mut self, asset: Arc<Asset>) {
        self.done = true;
        let mut slots = lock(&self.cache.slots);
        slots.insert(self.path.to_string(), Slot::Ready(asset));
        self.cache.fetched.notify_all();
    }
}

impl Drop for FetchClaim<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut slots = lock(&self.cache.slots);
            slots.remove(self.path);
            self.cache.fetched.notify_all();
        }
    }
}

/// In-progress download inside a path's cache directory
const PARTIAL_FILE: &str = ".partial";

/// Path-keyed cache of fetched assets.
///
/// Every path maps to one published `Arc<Asset>`; callers share it until
/// a refresh or invalidation publishes a replacement. Concurrent requests
/// for the same path wait on a single fetch.
///
/// Each path gets its own directory holding one file per etag. A fetch
/// downloads next to them and renames into place, so the bytes behind a
/// published asset never change. A replacement keeps the copy it replaced
/// and removes anything older.
pub struct AssetCache {
    source: Arc<dyn AssetSource>,
    cache_dir: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
    fetched: Condvar,
    workers: usize,
    events: EventLog,
}

impl AssetCache {
    pub fn new(source: Arc<dyn AssetSource>, cache_dir: impl Into<PathBuf>, workers: usize, events: EventLog) -> Self {
        Self {
            source,
            cache_dir: cache_dir.into(),
            slots: Mutex::new(HashMap::new()),
            fetched: Condvar::new(),
            workers: workers.max(1),
            events,
        }
    }

    /// Published asset for `path`, fetching it on first use or after an
    /// invalidation. Failed fetches publish a `NotCached` asset.
    pub fn get_asset(&self, path: &str) -> Arc<Asset> {
        let mut slots = lock(&self.slots);
        loop {
            match slots.get(path) {
                Some(Slot::Ready(asset)) if asset.status != CacheStatus::Invalid => return asset.clone(),
                Some(Slot::Fetching) => {
                    slots = self.fetched.wait(slots).unwrap_or_else(|e| e.into_inner());
                }
                _ => break,
            }
        }
        slots.insert(path.to_string(), Slot::Fetching);
        drop(slots);

        let claim = FetchClaim {
            cache: self,
            path,
            done: false,
        };
        let asset = Arc::new(self.fetch(path));
        claim.publish(asset.clone());
        asset
    }

    /// Currently published asset, without fetching
    pub fn peek(&self, path: &str) -> Option<Arc<Asset>> {
        match lock(&self.slots).get(path) {
            Some(Slot::Ready(asset)) => Some(asset.clone()),
            _ => None,
        }
    }

    /// Check `path` against the source and publish a replacement when its
    /// metadata changed or it was never cached. Returns the replacement.
    pub fn refresh(&self, path: &str) -> Option<Arc<Asset>> {
        let current = {
            let mut slots = lock(&self.slots);
            loop {
                match slots.get(path) {
                    Some(Slot::Fetching) => {
                        slots = self.fetched.wait(slots).unwrap_or_else(|e| e.into_inner());
                    }
                    Some(Slot::Ready(asset)) => {
                        let asset = asset.clone();
                        slots.insert(path.to_string(), Slot::Fetching);
                        break Some(asset);
                    }
                    None => {
                        slots.insert(path.to_string(), Slot::Fetching);
                        break None;
                    }
                }
            }
        };

        let claim = FetchClaim {
            cache: self,
            path,
            done: false,
        };
        let replacement = match &current {
            Some(asset) if asset.is_cached() => match self.source.probe(path) {
                Ok(meta) if meta == asset.meta && self.local_path(path, &meta.etag).is_file() => None,
                Ok(_) => {
                    // keep serving the stale copy if the new one can't be fetched
                    let fetched = self.fetch(path);
                    fetched.is_cached().then_some(fetched)
                }
                Err(e) => {
                    debug!("Keeping cached '{}': {}", path, e.user_message());
                    None
                }
            },
            Some(asset) => {
                let fetched = self.fetch(path);
                (fetched != **asset).then_some(fetched)
            }
            None => Some(self.fetch(path)),
        };

        match (replacement, current) {
            (Some(asset), previous) => {
                let mut keep = vec![asset.meta.etag.as_str()];
                if let Some(previous) = &previous {
                    keep.push(previous.meta.etag.as_str());
                }
                self.prune(path, &keep);
                let asset = Arc::new(asset);
                claim.publish(asset.clone());
                Some(asset)
            }
            (None, Some(current)) => {
                claim.publish(current);
                None
            }
            (None, None) => None,
        }
    }

    /// Publish an `Invalid` asset for `path`; the next `get_asset` refetches
    pub fn invalidate(&self, path: &str) -> Arc<Asset> {
        let asset = Arc::new(Asset::invalid(path));
        let mut slots = lock(&self.slots);
        while matches!(slots.get(path), Some(Slot::Fetching)) {
            slots = self.fetched.wait(slots).unwrap_or_else(|e| e.into_inner());
        }
        slots.insert(path.to_string(), Slot::Ready(asset.clone()));
        asset
    }

    /// Refresh every path on a small pool of scoped workers. Returns the
    /// assets that were replaced.
    pub fn warm(&self, paths: &[String]) -> Vec<Arc<Asset>> {
        let next = AtomicUsize::new(0);
        let replaced = Mutex::new(Vec::new());
        let workers = self.workers.min(paths.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = paths.get(index) else {
                        break;
                    };
                    if let Some(asset) = self.refresh(path) {
                        lock(&replaced).push(asset);
                    }
                });
            }
        });

        replaced.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    /// Where the copy of `path` with tag `etag` lives
    pub fn local_path(&self, path: &str, etag: &str) -> PathBuf {
        self.path_dir(path).join(storage_name(etag))
    }

    fn path_dir(&self, path: &str) -> PathBuf {
        self.cache_dir.join(storage_name(path))
    }

    pub fn read_bytes(&self, asset: &Asset) -> Result<Vec<u8>, AssetError> {
        if !asset.is_cached() {
            return Err(AssetError::NotCached {
                path: asset.path.clone(),
            });
        }
        Ok(fs::read(self.local_path(&asset.path, &asset.meta.etag))?)
    }

    fn fetch(&self, path: &str) -> Asset {
        match self.download(path) {
            Ok(meta) => {
                self.events.asset_fetched(path, &meta.etag);
                Asset::new(path, meta, CacheStatus::Cached)
            }
            Err(e) => {
                warn!("Failed to fetch asset '{}': {}", path, e.user_message());
                self.events.asset_failed(path, &e.user_message());
                Asset::new(path, AssetMeta::default(), CacheStatus::NotCached)
            }
        }
    }

    /// Download into a scratch file, then move it to its per-etag name.
    /// Only the caller holding the path's fetch claim writes here.
    fn download(&self, path: &str) -> Result<AssetMeta, AssetError> {
        let dir = self.path_dir(path);
        fs::create_dir_all(&dir)?;
        let partial = dir.join(PARTIAL_FILE);
        let result = self.source.fetch(path, &partial).and_then(|meta| {
            fs::rename(&partial, self.local_path(path, &meta.etag))?;
            Ok(meta)
        });
        if result.is_err() && partial.exists() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    /// Remove cached copies of `path` other than the `keep` etags
    fn prune(&self, path: &str, keep: &[&str]) {
        let Ok(entries) = fs::read_dir(self.path_dir(path)) else {
            return;
        };
        let keep: Vec<String> = keep.iter().map(|etag| storage_name(etag)).collect();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == PARTIAL_FILE || keep.iter().any(|kept| *kept == name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!("Removed old copy {} of '{}'", name, path),
                Err(e) => warn!("Could not remove old copy of '{}': {}", path, e),
            }
        }
    }
}
