//! End-to-end scenarios across the scheduler, asset cache and persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

use crate::config::SchedulerConfig;
use crate::error::AssetError;
use crate::logging::EventLog;
use crate::models::{AssetMeta, Playlist, PlaylistItem};
use crate::playlist::{AssetSource, FileAssetSource, PlaybackState, PlaylistScheduler, RasterImageDecoder};

const TIMEOUT: Duration = Duration::from_secs(10);

struct Site {
    dir: TempDir,
}

impl Site {
    fn new() -> Self {
        let site = Self {
            dir: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(site.asset_dir()).unwrap();
        site
    }

    fn asset_dir(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    fn config(&self) -> SchedulerConfig {
        SchedulerConfig {
            cache_dir: self.dir.path().join("cache"),
            asset_dir: self.asset_dir(),
            refresh_interval_secs: 3600,
            persist_interval_secs: 3600,
            ..SchedulerConfig::default()
        }
    }

    fn image(&self, name: &str, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]))
            .save(self.asset_dir().join(name))
            .unwrap();
    }

    fn scheduler(&self, events: &EventLog) -> PlaylistScheduler {
        PlaylistScheduler::from_config(&self.config(), events.clone()).unwrap()
    }
}

fn playlist(id: &str, slides: &[(&str, f64)]) -> Playlist {
    let items = slides
        .iter()
        .enumerate()
        .map(|(i, (path, duration))| PlaylistItem::new(format!("slide{}", i), "image", *path, *duration))
        .collect();
    Playlist::new(id, items)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_looping_playlist_timeline() {
    let site = Site::new();
    site.image("first.png", 4, 3);
    site.image("second.png", 2, 2);
    let events = EventLog::new();
    let scheduler = site.scheduler(&events);

    scheduler.add_playlist(playlist("lobby", &[("first.png", 5.0), ("second.png", 3.0)]));

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    let slide = scheduler.on_frame(0.0).unwrap();
    assert_eq!(slide.slide_index, 0);
    assert!(!slide.error);
    let image = slide.image.unwrap();
    assert_eq!((image.width, image.height), (4, 3));

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    let slide = scheduler.on_frame(5.0).unwrap();
    assert_eq!(slide.slide_index, 1);
    assert_eq!(slide.image.unwrap().width, 2);

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    assert_eq!(scheduler.on_frame(3.0).unwrap().slide_index, 0);

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    assert!(scheduler.on_frame(0.1).is_none());

    let current = scheduler.current_position().unwrap();
    assert_eq!(current.playlist_id, "lobby");
    assert_eq!(current.slide_index, 0);
    assert!((current.elapsed - 0.1).abs() < 1e-9);

    assert_eq!(scheduler.loop_count(), 1);
    assert_eq!(scheduler.last_loop_position().unwrap().slide_index, 0);
    let stats = events.statistics();
    assert_eq!(stats.slides_shown, 3);
    assert_eq!(stats.loops, 1);
}

/// Asset source whose fetches block until released
struct GatedSource {
    inner: FileAssetSource,
    open: Mutex<bool>,
    opened: Condvar,
    fetches: Mutex<HashMap<String, usize>>,
}

impl GatedSource {
    fn new(root: &Path) -> Self {
        Self {
            inner: FileAssetSource::new(root),
            open: Mutex::new(false),
            opened: Condvar::new(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl AssetSource for GatedSource {
    fn probe(&self, path: &str) -> Result<AssetMeta, AssetError> {
        self.inner.probe(path)
    }

    fn fetch(&self, path: &str, dest: &Path) -> Result<AssetMeta, AssetError> {
        *self.fetches.lock().unwrap().entry(path.to_string()).or_default() += 1;
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        self.inner.fetch(path, dest)
    }
}

#[test]
fn test_slow_asset_holds_frames_and_delivers_once() {
    let site = Site::new();
    site.image("a.png", 1, 1);
    site.image("b.png", 1, 1);
    let source = Arc::new(GatedSource::new(&site.asset_dir()));
    let events = EventLog::new();
    let scheduler =
        PlaylistScheduler::new(&site.config(), source.clone(), Arc::new(RasterImageDecoder), events.clone()).unwrap();

    scheduler.add_playlist(playlist("lobby", &[("a.png", 1.0), ("b.png", 1.0)]));

    for _ in 0..10 {
        assert!(scheduler.on_frame(0.016).is_none());
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(scheduler.state(), PlaybackState::Preparing);
    assert!(scheduler.held_frames() >= 10);
    assert_eq!(events.statistics().held_frames, 1);

    source.release();
    assert!(scheduler.wait_for_prepared(TIMEOUT));
    let slide = scheduler.on_frame(0.016).unwrap();
    assert_eq!(slide.slide_index, 0);
    assert!(!slide.error);

    // handed out once; the next slide is not due yet
    assert!(scheduler.wait_for_prepared(TIMEOUT));
    for _ in 0..5 {
        assert!(scheduler.on_frame(0.016).is_none());
    }
    assert_eq!(events.statistics().slides_shown, 1);
    assert_eq!(source.fetch_count("a.png"), 1);
    assert_eq!(source.fetch_count("b.png"), 1);
}

#[test]
fn test_shared_asset_is_one_object() {
    let site = Site::new();
    site.image("logo.png", 1, 1);
    let events = EventLog::new();
    let scheduler = site.scheduler(&events);

    scheduler.add_playlist(playlist("lobby", &[("logo.png", 5.0)]));
    scheduler.add_playlist(playlist("cafe", &[("logo.png", 5.0)]));
    scheduler.refresh_assets();

    let attached = |id: &str| scheduler.playlist(id).and_then(|p| p.items[0].asset.clone());
    assert!(wait_until(|| attached("lobby").is_some() && attached("cafe").is_some()));

    let cached = scheduler.assets().peek("logo.png").unwrap();
    assert!(cached.is_cached());
    assert!(Arc::ptr_eq(&attached("lobby").unwrap(), &cached));
    assert!(Arc::ptr_eq(&attached("cafe").unwrap(), &cached));
}

#[test]
fn test_changed_asset_is_picked_up_by_refresh() {
    let site = Site::new();
    site.image("menu.png", 2, 2);
    let events = EventLog::new();
    let scheduler = site.scheduler(&events);
    scheduler.add_playlist(playlist("lobby", &[("menu.png", 1.0), ("menu.png", 1.0)]));

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    assert_eq!(scheduler.on_frame(0.0).unwrap().image.unwrap().width, 2);
    let before = scheduler.assets().peek("menu.png").unwrap();

    site.image("menu.png", 8, 8);
    scheduler.refresh_assets();
    assert!(wait_until(|| scheduler
        .assets()
        .peek("menu.png")
        .is_some_and(|asset| !Arc::ptr_eq(&asset, &before))));
    assert!(wait_until(|| scheduler
        .playlist("lobby")
        .and_then(|p| p.items[1].asset.clone())
        .is_some_and(|asset| !Arc::ptr_eq(&asset, &before))));

    // the slide after next is built from the new file
    assert!(scheduler.wait_for_prepared(TIMEOUT));
    scheduler.on_frame(1.0).unwrap();
    assert!(scheduler.wait_for_prepared(TIMEOUT));
    assert_eq!(scheduler.on_frame(1.0).unwrap().image.unwrap().width, 8);
}

#[test]
fn test_position_survives_restart() {
    let site = Site::new();
    site.image("a.png", 1, 1);
    let events = EventLog::new();

    let mut first = site.scheduler(&events);
    first.add_playlist(playlist("lobby", &[("a.png", 1.0), ("a.png", 1.0), ("a.png", 1.0)]));
    assert!(first.wait_for_prepared(TIMEOUT));
    first.on_frame(0.0).unwrap();
    assert!(first.wait_for_prepared(TIMEOUT));
    assert_eq!(first.on_frame(1.0).unwrap().slide_index, 1);
    first.exit();

    let second = site.scheduler(&events);
    let restored = second.playlist("lobby").unwrap();
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.last_played_item, 1);

    assert!(second.wait_for_prepared(TIMEOUT));
    let slide = second.on_frame(0.0).unwrap();
    assert_eq!(slide.playlist_id, "lobby");
    assert_eq!(slide.slide_index, 1);
}

#[test]
fn test_missing_asset_still_takes_its_turn() {
    let site = Site::new();
    site.image("a.png", 1, 1);
    let events = EventLog::new();
    let scheduler = site.scheduler(&events);
    scheduler.add_playlist(playlist("lobby", &[("a.png", 1.0), ("missing.png", 1.0)]));

    assert!(scheduler.wait_for_prepared(TIMEOUT));
    assert!(!scheduler.on_frame(0.0).unwrap().error);
    assert!(scheduler.wait_for_prepared(TIMEOUT));
    let broken = scheduler.on_frame(1.0).unwrap();
    assert_eq!(broken.slide_index, 1);
    assert!(broken.error);
    assert!(broken.image.is_none());
    assert!(events.statistics().asset_failures >= 1);
}
