use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cache state of an asset. Only ever advances along an asset's lineage;
/// a reset publishes a new [`Asset`] instead of mutating the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheStatus {
    Invalid,
    NotCached,
    Cached,
}

/// Metadata reported by the asset source
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetMeta {
    pub etag: String,
}

/// A cached media file. Immutable once published; shared via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: String,
    pub meta: AssetMeta,
    pub status: CacheStatus,
}

impl Asset {
    pub fn new(path: impl Into<String>, meta: AssetMeta, status: CacheStatus) -> Self {
        Self {
            path: path.into(),
            meta,
            status,
        }
    }

    pub fn invalid(path: impl Into<String>) -> Self {
        Self::new(path, AssetMeta::default(), CacheStatus::Invalid)
    }

    pub fn is_cached(&self) -> bool {
        self.status == CacheStatus::Cached
    }
}

/// Kind of slide an item renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideType {
    #[default]
    Unknown,
    Image,
    Bars,
    Winners,
}

impl SlideType {
    /// Map the item type tag used in playlist files
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "image" | "picture" => SlideType::Image,
            "bars" | "overlay_bars" => SlideType::Bars,
            "winners" | "overlay_winners" => SlideType::Winners,
            _ => SlideType::Unknown,
        }
    }
}

/// Rectangle in normalized screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BarRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// One entry of a playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub path: String,
    /// Display duration in seconds
    pub duration: f64,
    #[serde(default)]
    pub transition_id: u32,
    #[serde(default)]
    pub transition_duration: f32,
    #[serde(default)]
    pub manual_advance: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub bar_color: String,
    #[serde(default)]
    pub bar_blink_color1: String,
    #[serde(default)]
    pub bar_blink_color2: String,
    #[serde(default = "default_alpha")]
    pub bar_alpha: f32,
    #[serde(default)]
    pub bar_positions: Vec<BarRect>,

    #[serde(skip)]
    pub asset: Option<Arc<Asset>>,
}

fn default_alpha() -> f32 {
    1.0
}

impl PlaylistItem {
    pub fn new(id: impl Into<String>, item_type: &str, path: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            item_type: item_type.to_string(),
            path: path.into(),
            duration,
            transition_id: 0,
            transition_duration: 0.0,
            manual_advance: false,
            mute: false,
            bar_color: String::new(),
            bar_blink_color1: String::new(),
            bar_blink_color2: String::new(),
            bar_alpha: default_alpha(),
            bar_positions: Vec::new(),
            asset: None,
        }
    }

    pub fn slide_type(&self) -> SlideType {
        SlideType::from_tag(&self.item_type)
    }
}

/// Ordered list of slides. Mutated copy-on-write through `Arc::make_mut`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub callback_url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "loop", default = "default_loop")]
    pub looping: bool,
    #[serde(default)]
    pub last_played_item: usize,
    pub items: Vec<PlaylistItem>,

    #[serde(skip, default = "default_dirty")]
    pub dirty: bool,
}

fn default_loop() -> bool {
    true
}

fn default_dirty() -> bool {
    true
}

impl Playlist {
    pub fn new(id: impl Into<String>, items: Vec<PlaylistItem>) -> Self {
        Self {
            id: id.into(),
            callback_url: String::new(),
            timestamp: Utc::now(),
            looping: true,
            last_played_item: 0,
            items,
            dirty: true,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    /// Index following `index`, wrapping when the playlist loops
    pub fn successor(&self, index: usize) -> Option<usize> {
        if index + 1 < self.items.len() {
            Some(index + 1)
        } else if self.looping && !self.items.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    /// Index preceding `index`, wrapping when the playlist loops
    pub fn predecessor(&self, index: usize) -> Option<usize> {
        if index > 0 && index <= self.items.len() {
            Some(index - 1)
        } else if self.looping && !self.items.is_empty() {
            Some(self.items.len() - 1)
        } else {
            None
        }
    }
}

/// Committed location in a playlist
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayPosition {
    pub playlist_id: String,
    pub slide_index: usize,
    #[serde(skip)]
    pub dirty: bool,
}

impl PlayPosition {
    pub fn new(playlist_id: impl Into<String>, slide_index: usize) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            slide_index,
            dirty: true,
        }
    }

    pub fn same_slide(&self, other: &PlayPosition) -> bool {
        self.playlist_id == other.playlist_id && self.slide_index == other.slide_index
    }
}

/// Decoded RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Overlay bar styling resolved from a playlist item
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBars {
    pub bar_color: u32,
    pub blink_color1: u32,
    pub blink_color2: u32,
    pub alpha: f32,
    pub positions: Vec<BarRect>,
    pub winners: bool,
}

/// Fully prepared slide, handed over by value from `on_frame`
#[derive(Debug, Clone)]
pub struct NewSlideData {
    pub playlist_id: String,
    pub slide_index: usize,
    pub slide_id: String,
    pub slide_type: SlideType,
    pub transition_id: u32,
    pub transition_time: f32,
    pub image: Option<ImageData>,
    pub overlay: Option<OverlayBars>,
    pub mute: bool,
    /// Set when the asset could not be fetched or decoded
    pub error: bool,
}
