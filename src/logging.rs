use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::sync::lock;

/// Initialize logging with the level from `SIGNAGE_LOG_LEVEL` (default `info`).
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var("SIGNAGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    match log_level.to_lowercase().as_str() {
        "trace" => builder.filter_level(log::LevelFilter::Trace),
        "debug" => builder.filter_level(log::LevelFilter::Debug),
        "info" => builder.filter_level(log::LevelFilter::Info),
        "warn" => builder.filter_level(log::LevelFilter::Warn),
        "error" => builder.filter_level(log::LevelFilter::Error),
        _ => builder.filter_level(log::LevelFilter::Info),
    };

    builder.try_init()?;

    info!("Signage player logging initialized with level: {}", log_level);
    Ok(())
}

/// Playback event kept in the event history
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    SlideShown,
    SlideHeld,
    PlaylistLooped,
    AssetFetched,
    AssetFailed,
    AudioLoaded,
    AudioLoadFailed,
    RenderUnderrun,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::SlideShown => "SLIDE_SHOWN",
            PlaybackEventType::SlideHeld => "SLIDE_HELD",
            PlaybackEventType::PlaylistLooped => "PLAYLIST_LOOPED",
            PlaybackEventType::AssetFetched => "ASSET_FETCHED",
            PlaybackEventType::AssetFailed => "ASSET_FAILED",
            PlaybackEventType::AudioLoaded => "AUDIO_LOADED",
            PlaybackEventType::AudioLoadFailed => "AUDIO_LOAD_FAILED",
            PlaybackEventType::RenderUnderrun => "RENDER_UNDERRUN",
        }
    }
}

/// Bounded playback event history shared by the engine and the scheduler.
///
/// Every event is mirrored to the `log` facade. Counters in
/// [`EventStatistics`] are kept separately so they survive history eviction.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    totals: Arc<Mutex<EventStatistics>>,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            totals: Arc::new(Mutex::new(EventStatistics::default())),
            max_events: 1000,
        }
    }

    pub fn log_event(&self, event_type: PlaybackEventType, details: String) {
        match event_type {
            PlaybackEventType::SlideShown
            | PlaybackEventType::PlaylistLooped
            | PlaybackEventType::AudioLoaded => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::AssetFetched | PlaybackEventType::SlideHeld => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::AssetFailed
            | PlaybackEventType::AudioLoadFailed
            | PlaybackEventType::RenderUnderrun => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
        }

        lock(&self.totals).record(event_type);

        let mut events = lock(&self.events);
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn slide_shown(&self, playlist: &str, slide: usize) {
        self.log_event(
            PlaybackEventType::SlideShown,
            format!("Showing slide {} of playlist '{}'", slide, playlist),
        );
    }

    pub fn slide_held(&self, playlist: &str, slide: usize) {
        self.log_event(
            PlaybackEventType::SlideHeld,
            format!("Slide {} of playlist '{}' is due but not prepared", slide, playlist),
        );
    }

    pub fn playlist_looped(&self, playlist: &str) {
        self.log_event(PlaybackEventType::PlaylistLooped, format!("Playlist '{}' looped", playlist));
    }

    pub fn asset_fetched(&self, path: &str, etag: &str) {
        self.log_event(PlaybackEventType::AssetFetched, format!("Cached '{}' (etag {})", path, etag));
    }

    pub fn asset_failed(&self, path: &str, error: &str) {
        self.log_event(PlaybackEventType::AssetFailed, format!("Fetch failed for '{}': {}", path, error));
    }

    pub fn audio_loaded(&self, path: &str, format_info: &str) {
        self.log_event(PlaybackEventType::AudioLoaded, format!("Loaded '{}' ({})", path, format_info));
    }

    pub fn audio_load_failed(&self, path: &str, error: &str) {
        self.log_event(PlaybackEventType::AudioLoadFailed, format!("Cannot load '{}': {}", path, error));
    }

    pub fn render_underrun(&self, consumed: usize, buffer: usize) {
        self.log_event(
            PlaybackEventType::RenderUnderrun,
            format!("Output consumed {} of {} frames between render ticks", consumed, buffer),
        );
    }

    /// Get recent events, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let events = lock(&self.events);
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }

    /// Counters over everything logged since creation
    pub fn statistics(&self) -> EventStatistics {
        lock(&self.totals).clone()
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub slides_shown: usize,
    pub held_frames: usize,
    pub loops: usize,
    pub assets_fetched: usize,
    pub asset_failures: usize,
    pub audio_loads: usize,
    pub audio_load_failures: usize,
    pub render_underruns: usize,
}

impl EventStatistics {
    fn record(&mut self, event_type: PlaybackEventType) {
        self.total_events += 1;
        match event_type {
            PlaybackEventType::SlideShown => self.slides_shown += 1,
            PlaybackEventType::SlideHeld => self.held_frames += 1,
            PlaybackEventType::PlaylistLooped => self.loops += 1,
            PlaybackEventType::AssetFetched => self.assets_fetched += 1,
            PlaybackEventType::AssetFailed => self.asset_failures += 1,
            PlaybackEventType::AudioLoaded => self.audio_loads += 1,
            PlaybackEventType::AudioLoadFailed => self.audio_load_failures += 1,
            PlaybackEventType::RenderUnderrun => self.render_underruns += 1,
        }
    }
}
