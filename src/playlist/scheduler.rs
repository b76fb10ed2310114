//! Slide scheduling.
//!
//! The render loop calls [`PlaylistScheduler::on_frame`] once per frame.
//! The next slide is always prepared ahead of time on the `slide-prepare`
//! thread; `on_frame` only swaps a finished slide in when the current one
//! has run its course, so it never blocks on I/O or decoding. A slide that
//! is not ready yet keeps the current one on screen.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{PlayerError, PlaylistError};
use crate::logging::EventLog;
use crate::models::{NewSlideData, PlayPosition, Playlist};
use crate::playlist::assets::{AssetCache, AssetSource, FileAssetSource};
use crate::playlist::input::{InputEvent, KeyCode};
use crate::playlist::prepare::{ImageDecoder, RasterImageDecoder, SlideBuilder};
use crate::playlist::store::{PlaylistStore, StoreDir};
use crate::sync::{lock, CancellationToken, Signal};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Coarse scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing to show
    Idle,
    /// Waiting for the next slide to be prepared
    Preparing,
    /// The next slide is ready, or there is no next slide
    Playing,
}

/// What is on screen right now
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSlide {
    pub playlist_id: String,
    pub slide_index: usize,
    pub slide_id: String,
    pub elapsed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    Start,
    /// Forward: the duration timer or `next`
    Advance,
    /// `previous`
    Back,
    /// Explicit jump to a slide
    Seek,
}

#[derive(Debug, Clone)]
struct Target {
    position: PlayPosition,
    cause: Cause,
    generation: u64,
}

struct Prepared {
    target: Target,
    slide: NewSlideData,
}

struct Shown {
    playlist_id: String,
    slide_index: usize,
    slide_id: String,
    started_at: f64,
    duration: f64,
    manual: bool,
}

struct Schedule {
    store: PlaylistStore,
    time: f64,
    shown: Option<Shown>,
    target: Option<Target>,
    prepared: Option<Prepared>,
    generation: u64,
    switch_hard: bool,
    advance_forced: bool,
    /// Where the latest pass through a playlist began
    last_loop: Option<PlayPosition>,
    /// Set after stepping back across `last_loop` into the previous pass
    behind_loop: bool,
    loops: u64,
    held_frames: u64,
    holding: bool,
}

impl Schedule {
    /// Point preparation at a new slide. A prepared or in-flight slide for
    /// the same position is kept; anything else is discarded.
    fn retarget(&mut self, position: PlayPosition, cause: Cause) -> bool {
        if let Some(prepared) = self.prepared.as_mut() {
            if prepared.target.position.same_slide(&position) {
                prepared.target.cause = cause;
                self.target = Some(prepared.target.clone());
                return false;
            }
        }
        if let Some(target) = self.target.as_mut() {
            if self.prepared.is_none() && target.position.same_slide(&position) {
                target.cause = cause;
                return false;
            }
        }
        self.generation += 1;
        self.prepared = None;
        self.target = Some(Target {
            position,
            cause,
            generation: self.generation,
        });
        true
    }

    /// Rebuild the current target, e.g. after its playlist changed
    fn restart_target(&mut self) -> bool {
        let Some(target) = self.target.take() else {
            return false;
        };
        self.prepared = None;
        let Some(playlist) = self.store.get(&target.position.playlist_id) else {
            return self.start_anywhere();
        };
        if playlist.is_empty() {
            return false;
        }
        let index = if target.position.slide_index < playlist.len() {
            target.position.slide_index
        } else {
            0
        };
        let position = PlayPosition::new(playlist.id.clone(), index);
        self.generation += 1;
        self.target = Some(Target {
            position,
            cause: target.cause,
            generation: self.generation,
        });
        true
    }

    /// Target the first non-empty playlist where it was last left
    fn start_anywhere(&mut self) -> bool {
        let start = self
            .store
            .iter()
            .find(|p| !p.is_empty())
            .map(|p| PlayPosition::new(p.id.clone(), p.last_played_item.min(p.len() - 1)));
        match start {
            Some(position) => self.retarget(position, Cause::Start),
            None => false,
        }
    }

    /// Whether switching from slide `from` to `to` of the same playlist
    /// completes a pass. Stepping back across the loop point and then
    /// forward onto it again is not a new pass.
    fn completes_loop(&mut self, from: usize, to: &PlayPosition, cause: Cause) -> bool {
        let loop_in_playlist = self
            .last_loop
            .as_ref()
            .is_some_and(|point| point.playlist_id == to.playlist_id);
        match cause {
            Cause::Advance if to.slide_index <= from => {
                let back_onto_loop_point =
                    self.behind_loop && self.last_loop.as_ref().is_some_and(|point| point.same_slide(to));
                self.behind_loop = false;
                !back_onto_loop_point
            }
            Cause::Back if to.slide_index > from && loop_in_playlist => {
                self.behind_loop = true;
                false
            }
            Cause::Advance | Cause::Back => false,
            Cause::Start | Cause::Seek => {
                self.behind_loop = false;
                false
            }
        }
    }

    fn due(&self) -> bool {
        match &self.shown {
            None => true,
            Some(shown) => {
                let elapsed = self.time - shown.started_at;
                self.switch_hard || (elapsed >= shown.duration && (!shown.manual || self.advance_forced))
            }
        }
    }

    fn state(&self) -> PlaybackState {
        if self.shown.is_none() && self.target.is_none() {
            PlaybackState::Idle
        } else if self.target.is_some() && self.prepared.is_none() {
            PlaybackState::Preparing
        } else {
            PlaybackState::Playing
        }
    }
}

struct SchedulerShared {
    schedule: Mutex<Schedule>,
    prepared_ready: Condvar,
    prepare_signal: Signal,
    refresh_signal: Signal,
    persist_signal: Signal,
    cancel: CancellationToken,
    assets: Arc<AssetCache>,
    builder: SlideBuilder,
    store_dir: StoreDir,
    refresh_interval: Duration,
    persist_interval: Duration,
    events: EventLog,
}

/// Drives slide changes across a set of playlists.
///
/// Three background threads support it: `slide-prepare` builds the next
/// slide, `asset-refresh` keeps cached assets current and `playlist-persist`
/// writes playlists and the play position to the cache directory.
pub struct PlaylistScheduler {
    shared: Arc<SchedulerShared>,
    threads: Vec<JoinHandle<()>>,
}

impl PlaylistScheduler {
    /// Scheduler reading assets from `config.asset_dir`
    pub fn from_config(config: &SchedulerConfig, events: EventLog) -> Result<Self, PlayerError> {
        Self::new(
            config,
            Arc::new(FileAssetSource::new(&config.asset_dir)),
            Arc::new(RasterImageDecoder),
            events,
        )
    }

    /// Restore persisted playlists and start the background threads
    pub fn new(
        config: &SchedulerConfig,
        source: Arc<dyn AssetSource>,
        images: Arc<dyn ImageDecoder>,
        events: EventLog,
    ) -> Result<Self, PlayerError> {
        let store_dir = StoreDir::new(&config.cache_dir);
        let (playlists, position) = store_dir.load()?;

        let mut store = PlaylistStore::new(config.max_playlists);
        for playlist in playlists {
            store.add(playlist, None);
        }
        store.mark_clean();

        let mut schedule = Schedule {
            store,
            time: 0.0,
            shown: None,
            target: None,
            prepared: None,
            generation: 0,
            switch_hard: false,
            advance_forced: false,
            last_loop: None,
            behind_loop: false,
            loops: 0,
            held_frames: 0,
            holding: false,
        };

        let resumed = position.filter(|p| {
            schedule
                .store
                .get(&p.playlist_id)
                .is_some_and(|playlist| p.slide_index < playlist.len())
        });
        match resumed {
            Some(position) => {
                info!("Resuming playlist '{}' at slide {}", position.playlist_id, position.slide_index);
                schedule.retarget(PlayPosition::new(position.playlist_id, position.slide_index), Cause::Start);
            }
            None => {
                schedule.start_anywhere();
            }
        }

        let assets = Arc::new(AssetCache::new(
            source,
            config.cache_dir.join("assets"),
            config.fetch_workers,
            events.clone(),
        ));
        let shared = Arc::new(SchedulerShared {
            schedule: Mutex::new(schedule),
            prepared_ready: Condvar::new(),
            prepare_signal: Signal::new(),
            refresh_signal: Signal::new(),
            persist_signal: Signal::new(),
            cancel: CancellationToken::new(),
            builder: SlideBuilder::new(assets.clone(), images),
            assets,
            store_dir,
            refresh_interval: config.refresh_interval(),
            persist_interval: config.persist_interval(),
            events,
        });

        let mut scheduler = Self {
            shared,
            threads: Vec::new(),
        };
        let bodies: [(&str, fn(&SchedulerShared)); 3] = [
            ("slide-prepare", SchedulerShared::prepare_loop),
            ("asset-refresh", SchedulerShared::refresh_loop),
            ("playlist-persist", SchedulerShared::persist_loop),
        ];
        for (name, body) in bodies {
            let worker = scheduler.shared.clone();
            // on failure, dropping `scheduler` stops the threads already running
            let handle = thread::Builder::new()
                .name(name.to_string())
                .spawn(move || body(&worker))?;
            scheduler.threads.push(handle);
        }

        scheduler.shared.refresh_signal.set();
        scheduler.shared.prepare_signal.set();
        Ok(scheduler)
    }

    /// Advance the clock by `delta` seconds. Returns the slide to display
    /// when it is time to switch and the next slide is ready; each prepared
    /// slide is handed out exactly once.
    pub fn on_frame(&self, delta: f64) -> Option<NewSlideData> {
        let shared = &self.shared;
        let mut schedule = shared.schedule();
        if delta.is_finite() && delta > 0.0 {
            schedule.time += delta;
        }

        if !schedule.due() || schedule.target.is_none() {
            return None;
        }

        let Some(prepared) = schedule.prepared.take() else {
            schedule.held_frames += 1;
            if !schedule.holding {
                schedule.holding = true;
                if let Some(target) = &schedule.target {
                    shared
                        .events
                        .slide_held(&target.position.playlist_id, target.position.slide_index);
                }
            }
            return None;
        };
        schedule.holding = false;
        schedule.switch_hard = false;
        schedule.advance_forced = false;

        let position = prepared.target.position.clone();
        let playlist = schedule
            .store
            .get(&position.playlist_id)
            .filter(|playlist| position.slide_index < playlist.len())
            .cloned();
        let Some(playlist) = playlist else {
            // playlist went away while the slide was being prepared
            schedule.restart_target();
            shared.prepare_signal.set();
            return None;
        };
        let item = &playlist.items[position.slide_index];

        let previous = schedule
            .shown
            .as_ref()
            .filter(|shown| shown.playlist_id == position.playlist_id)
            .map(|shown| shown.slide_index);
        match previous {
            Some(from) => {
                if schedule.completes_loop(from, &position, prepared.target.cause) {
                    schedule.loops += 1;
                    schedule.last_loop = Some(position.clone());
                    shared.events.playlist_looped(&position.playlist_id);
                }
            }
            None => {
                // a new playlist starts a new pass
                schedule.last_loop = Some(position.clone());
                schedule.behind_loop = false;
            }
        }

        let now = schedule.time;
        schedule.shown = Some(Shown {
            playlist_id: position.playlist_id.clone(),
            slide_index: position.slide_index,
            slide_id: item.id.clone(),
            started_at: now,
            duration: item.duration,
            manual: item.manual_advance,
        });
        schedule.store.commit_position(&position.playlist_id, position.slide_index);
        schedule.store.mark_played(&position.playlist_id, position.slide_index);
        shared.events.slide_shown(&position.playlist_id, position.slide_index);

        schedule.target = None;
        if let Some(next) = playlist.successor(position.slide_index) {
            schedule.retarget(PlayPosition::new(playlist.id.clone(), next), Cause::Advance);
            shared.prepare_signal.set();
        }
        shared.persist_signal.set();

        Some(prepared.slide)
    }

    /// Add or replace a playlist. Returns `false` if it was older than the
    /// stored copy.
    pub fn add_playlist(&self, playlist: Playlist) -> bool {
        let id = playlist.id.clone();
        let mut schedule = self.shared.schedule();
        let protected = schedule.shown.as_ref().map(|shown| shown.playlist_id.clone());
        let outcome = schedule.store.add(playlist, protected.as_deref());
        if !outcome.added {
            return false;
        }
        info!("Playlist '{}' {}", id, if outcome.replaced { "updated" } else { "added" });

        let target_affected = schedule.target.as_ref().is_some_and(|target| {
            target.position.playlist_id == id || outcome.evicted.contains(&target.position.playlist_id)
        });
        if target_affected {
            schedule.restart_target();
        } else if schedule.target.is_none() && schedule.shown.is_none() {
            schedule.start_anywhere();
        } else if schedule.target.is_none() {
            // the shown playlist had run out; continue with the new one
            if let Some(shown) = &schedule.shown {
                if shown.playlist_id == id {
                    let next = schedule.store.get(&id).and_then(|p| p.successor(shown.slide_index));
                    if let Some(next) = next {
                        schedule.retarget(PlayPosition::new(id.clone(), next), Cause::Advance);
                    }
                }
            }
        }
        drop(schedule);

        self.shared.prepare_signal.set();
        self.shared.refresh_signal.set();
        self.shared.persist_signal.set();
        true
    }

    /// Jump to slide `slide_id` of playlist `playlist_id`. A hard seek
    /// switches as soon as the slide is prepared; a soft one waits for the
    /// current slide's duration.
    pub fn seek(&self, playlist_id: &str, slide_id: &str, hard: bool) -> Result<(), PlaylistError> {
        let mut schedule = self.shared.schedule();
        let playlist = schedule
            .store
            .get(playlist_id)
            .ok_or_else(|| PlaylistError::PlaylistNotFound { id: playlist_id.to_string() })?;
        let index = playlist.item_index(slide_id).ok_or_else(|| PlaylistError::SlideNotFound {
            playlist: playlist_id.to_string(),
            slide: slide_id.to_string(),
        })?;
        Self::seek_locked(&self.shared, &mut schedule, PlayPosition::new(playlist_id, index), hard);
        Ok(())
    }

    fn seek_locked(shared: &SchedulerShared, schedule: &mut Schedule, position: PlayPosition, hard: bool) {
        debug!(
            "Seeking to slide {} of '{}' ({})",
            position.slide_index,
            position.playlist_id,
            if hard { "hard" } else { "soft" }
        );
        if schedule.retarget(position, Cause::Seek) {
            shared.prepare_signal.set();
        }
        schedule.advance_forced = true;
        if hard {
            schedule.switch_hard = true;
        }
    }

    /// Move to the following slide. Unforced requests are ignored while a
    /// manual-advance slide is shown.
    pub fn next(&self, hard: bool, force: bool) -> bool {
        self.step(hard, force, true)
    }

    pub fn previous(&self, hard: bool, force: bool) -> bool {
        self.step(hard, force, false)
    }

    fn step(&self, hard: bool, force: bool, forward: bool) -> bool {
        let mut schedule = self.shared.schedule();
        let Some(shown) = &schedule.shown else {
            return false;
        };
        if shown.manual && !force {
            debug!("Ignoring unforced step on manual slide '{}'", shown.slide_id);
            return false;
        }
        let Some(playlist) = schedule.store.get(&shown.playlist_id) else {
            return false;
        };
        let index = if forward {
            playlist.successor(shown.slide_index)
        } else {
            playlist.predecessor(shown.slide_index)
        };
        let Some(index) = index else {
            return false;
        };

        let position = PlayPosition::new(playlist.id.clone(), index);
        let cause = if forward { Cause::Advance } else { Cause::Back };
        if schedule.retarget(position, cause) {
            self.shared.prepare_signal.set();
        }
        schedule.advance_forced = true;
        if hard {
            schedule.switch_hard = true;
        }
        true
    }

    /// Keyboard navigation. Returns whether the event was handled.
    pub fn on_input(&self, event: InputEvent) -> bool {
        let InputEvent::KeyPressed(key) = event;
        match key {
            KeyCode::Right | KeyCode::PageDown | KeyCode::Space => self.next(true, true),
            KeyCode::Left | KeyCode::PageUp => self.previous(true, true),
            KeyCode::Home => {
                let mut schedule = self.shared.schedule();
                let Some(playlist_id) = schedule.shown.as_ref().map(|shown| shown.playlist_id.clone()) else {
                    return false;
                };
                Self::seek_locked(&self.shared, &mut schedule, PlayPosition::new(playlist_id, 0), true);
                true
            }
            KeyCode::Other(_) => false,
        }
    }

    pub fn current_position(&self) -> Option<CurrentSlide> {
        let schedule = self.shared.schedule();
        schedule.shown.as_ref().map(|shown| CurrentSlide {
            playlist_id: shown.playlist_id.clone(),
            slide_index: shown.slide_index,
            slide_id: shown.slide_id.clone(),
            elapsed: schedule.time - shown.started_at,
        })
    }

    /// Block until a slide is prepared or `timeout` elapses
    pub fn wait_for_prepared(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut schedule = self.shared.schedule();
        while schedule.prepared.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            schedule = self
                .shared
                .prepared_ready
                .wait_timeout(schedule, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.schedule().state()
    }

    pub fn playlists(&self) -> Vec<Arc<Playlist>> {
        self.shared.schedule().store.iter().cloned().collect()
    }

    pub fn playlist(&self, id: &str) -> Option<Arc<Playlist>> {
        self.shared.schedule().store.get(id).cloned()
    }

    /// Number of times playback wrapped to the start of a playlist
    pub fn loop_count(&self) -> u64 {
        self.shared.schedule().loops
    }

    pub fn last_loop_position(&self) -> Option<PlayPosition> {
        self.shared.schedule().last_loop.clone()
    }

    /// Frames on which a switch was due but the next slide was not ready
    pub fn held_frames(&self) -> u64 {
        self.shared.schedule().held_frames
    }

    pub fn assets(&self) -> &Arc<AssetCache> {
        &self.shared.assets
    }

    /// Run an asset refresh pass now
    pub fn refresh_assets(&self) {
        self.shared.refresh_signal.set();
    }

    /// Stop the background threads and write any pending state
    pub fn exit(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.shared.cancel.cancel();
        self.shared.prepare_signal.set();
        self.shared.refresh_signal.set();
        self.shared.persist_signal.set();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
        self.shared.persist_now();
    }
}

impl Drop for PlaylistScheduler {
    fn drop(&mut self) {
        self.exit();
    }
}

impl SchedulerShared {
    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        lock(&self.schedule)
    }

    /// Wait for `signal` or `interval`, whichever comes first. Returns
    /// `false` once cancelled.
    fn wait_for(&self, signal: &Signal, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            if signal.wait_timeout((deadline - now).min(POLL_INTERVAL)) {
                return !self.cancel.is_cancelled();
            }
        }
    }

    fn prepare_loop(&self) {
        debug!("Slide preparation started");
        while !self.cancel.is_cancelled() {
            let job = {
                let schedule = self.schedule();
                match (&schedule.target, &schedule.prepared) {
                    (Some(target), None) => schedule
                        .store
                        .get(&target.position.playlist_id)
                        .map(|playlist| (target.clone(), playlist.clone())),
                    _ => None,
                }
            };
            let Some((target, playlist)) = job else {
                self.prepare_signal.wait_timeout(POLL_INTERVAL);
                continue;
            };

            let built = self.builder.build(&playlist, target.position.slide_index);

            let mut schedule = self.schedule();
            if schedule.generation != target.generation || schedule.prepared.is_some() {
                debug!("Discarding superseded slide {}", target.position.slide_index);
                continue;
            }
            match built {
                Some(slide) => {
                    let target = schedule.target.clone().unwrap_or(target);
                    schedule.prepared = Some(Prepared { target, slide });
                    self.prepared_ready.notify_all();
                }
                None => {
                    warn!(
                        "Slide {} no longer exists in '{}'",
                        target.position.slide_index, target.position.playlist_id
                    );
                    schedule.restart_target();
                }
            }
        }
        debug!("Slide preparation stopped");
    }

    fn refresh_loop(&self) {
        loop {
            let paths: Vec<String> = self.schedule().store.asset_paths().into_iter().collect();
            if !paths.is_empty() {
                let replaced = self.assets.warm(&paths);
                let current: Vec<_> = paths.iter().filter_map(|path| self.assets.peek(path)).collect();
                let mut schedule = self.schedule();
                let attached: usize = current.iter().map(|asset| schedule.store.attach_asset(asset)).sum();
                if !replaced.is_empty() {
                    info!("Refreshed {} assets ({} slide references)", replaced.len(), attached);
                }
            }
            if !self.wait_for(&self.refresh_signal, self.refresh_interval) {
                break;
            }
        }
    }

    fn persist_loop(&self) {
        while self.wait_for(&self.persist_signal, self.persist_interval) {
            self.persist_now();
        }
    }

    /// Write dirty playlists and the play position outside the lock
    fn persist_now(&self) {
        let snapshot = self.schedule().store.take_dirty();
        if snapshot.is_empty() {
            return;
        }
        if let Err(e) = self.store_dir.write(&snapshot) {
            warn!("Failed to persist playback state: {}", e.user_message());
            self.schedule().store.restore_dirty(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssetError;
    use crate::models::{AssetMeta, ImageData, PlaylistItem};
    use std::path::Path;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Every path exists and decodes to a 1x1 image
    struct AnySource;

    impl AssetSource for AnySource {
        fn probe(&self, _path: &str) -> Result<AssetMeta, AssetError> {
            Ok(AssetMeta { etag: "v1".into() })
        }

        fn fetch(&self, path: &str, dest: &Path) -> Result<AssetMeta, AssetError> {
            std::fs::write(dest, path.as_bytes())?;
            self.probe(path)
        }
    }

    struct PixelDecoder;

    impl ImageDecoder for PixelDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<ImageData, String> {
            Ok(ImageData {
                width: 1,
                height: 1,
                rgba: vec![0, 0, 0, 255],
            })
        }
    }

    fn config(dir: &TempDir) -> SchedulerConfig {
        SchedulerConfig {
            cache_dir: dir.path().join("cache"),
            asset_dir: dir.path().join("assets"),
            persist_interval_secs: 3600,
            refresh_interval_secs: 3600,
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(dir: &TempDir) -> PlaylistScheduler {
        PlaylistScheduler::new(&config(dir), Arc::new(AnySource), Arc::new(PixelDecoder), EventLog::new()).unwrap()
    }

    fn playlist(id: &str, durations: &[f64]) -> Playlist {
        let items = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| PlaylistItem::new(format!("s{}", i), "image", format!("{}.png", i), d))
            .collect();
        Playlist::new(id, items)
    }

    fn frame(scheduler: &PlaylistScheduler, delta: f64) -> Option<NewSlideData> {
        assert!(scheduler.wait_for_prepared(TIMEOUT));
        scheduler.on_frame(delta)
    }

    #[test]
    fn test_idle_without_playlists() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert!(scheduler.on_frame(1.0).is_none());
        assert!(scheduler.current_position().is_none());
        assert!(!scheduler.next(true, true));
    }

    #[test]
    fn test_manual_slide_ignores_unforced_next() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        let mut list = playlist("lobby", &[1.0, 1.0]);
        list.items[0].manual_advance = true;
        scheduler.add_playlist(list);

        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);
        assert!(scheduler.wait_for_prepared(TIMEOUT));
        // duration elapsed but the slide waits for a forced advance
        assert!(scheduler.on_frame(5.0).is_none());
        assert!(!scheduler.next(true, false));
        assert!(scheduler.on_frame(0.1).is_none());

        assert!(scheduler.next(false, true));
        assert_eq!(frame(&scheduler, 0.1).unwrap().slide_index, 1);
    }

    #[test]
    fn test_hard_seek_switches_before_duration() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        scheduler.add_playlist(playlist("lobby", &[10.0, 10.0, 10.0]));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);

        scheduler.seek("lobby", "s2", true).unwrap();
        let slide = frame(&scheduler, 0.1).unwrap();
        assert_eq!(slide.slide_id, "s2");
        // seeking backwards is not a loop
        assert_eq!(scheduler.loop_count(), 0);

        assert!(matches!(
            scheduler.seek("lobby", "nope", true),
            Err(PlaylistError::SlideNotFound { .. })
        ));
        assert!(matches!(
            scheduler.seek("gone", "s0", true),
            Err(PlaylistError::PlaylistNotFound { .. })
        ));
    }

    #[test]
    fn test_soft_seek_waits_for_duration() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        scheduler.add_playlist(playlist("lobby", &[2.0, 2.0, 2.0]));
        assert!(frame(&scheduler, 0.0).is_some());

        scheduler.seek("lobby", "s2", false).unwrap();
        assert!(frame(&scheduler, 1.0).is_none());
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_id, "s2");
    }

    #[test]
    fn test_keyboard_navigation() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        scheduler.add_playlist(playlist("lobby", &[10.0, 10.0, 10.0]));
        assert!(frame(&scheduler, 0.0).is_some());

        assert!(scheduler.on_input(InputEvent::KeyPressed(KeyCode::Left)));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 2);
        assert!(scheduler.on_input(InputEvent::KeyPressed(KeyCode::Home)));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);
        assert!(scheduler.on_input(InputEvent::KeyPressed(KeyCode::Space)));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 1);
        assert!(!scheduler.on_input(InputEvent::KeyPressed(KeyCode::Other('x'))));
    }

    #[test]
    fn test_non_looping_playlist_stops_on_last_slide() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        let mut list = playlist("once", &[1.0, 1.0]);
        list.looping = false;
        scheduler.add_playlist(list);

        assert!(frame(&scheduler, 0.0).is_some());
        assert!(frame(&scheduler, 1.0).is_some());
        assert!(scheduler.on_frame(5.0).is_none());
        assert_eq!(scheduler.current_position().unwrap().slide_index, 1);
        assert_eq!(scheduler.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_replacing_playlist_rebuilds_pending_slide() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        scheduler.add_playlist(playlist("lobby", &[1.0, 1.0]));
        assert!(frame(&scheduler, 0.0).is_some());

        let mut updated = playlist("lobby", &[1.0, 1.0]);
        updated.items[1].id = "fresh".into();
        assert!(scheduler.add_playlist(updated));
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_id, "fresh");

        let mut stale = playlist("lobby", &[1.0]);
        stale.timestamp -= chrono::Duration::hours(1);
        assert!(!scheduler.add_playlist(stale));
    }

    #[test]
    fn test_stepping_back_across_loop_point() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir);
        scheduler.add_playlist(playlist("lobby", &[1.0, 1.0, 1.0]));

        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 1);
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 2);
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 0);
        assert_eq!(scheduler.loop_count(), 1);
        assert_eq!(scheduler.last_loop_position().unwrap().slide_index, 0);

        // back over the loop point and forward onto it again
        assert!(scheduler.previous(true, true));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 2);
        assert!(scheduler.next(true, true));
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);
        assert_eq!(scheduler.loop_count(), 1);

        // an explicit jump back to the start is not a pass either
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 1);
        scheduler.seek("lobby", "s0", true).unwrap();
        assert_eq!(frame(&scheduler, 0.0).unwrap().slide_index, 0);
        assert_eq!(scheduler.loop_count(), 1);

        // a full pass afterwards still counts
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 1);
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 2);
        assert_eq!(frame(&scheduler, 1.0).unwrap().slide_index, 0);
        assert_eq!(scheduler.loop_count(), 2);
    }
}
