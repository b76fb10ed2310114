use std::sync::Arc;

use log::warn;

use crate::error::AssetError;
use crate::models::{ImageData, NewSlideData, OverlayBars, Playlist, PlaylistItem, SlideType};
use crate::playlist::assets::AssetCache;

const DEFAULT_BAR_COLOR: u32 = 0xffff_ffff;

/// Turns encoded image bytes into RGBA pixels
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<ImageData, String>;
}

/// PNG and JPEG decoding through the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterImageDecoder;

impl ImageDecoder for RasterImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<ImageData, String> {
        let image = image::load_from_memory(bytes).map_err(|e| e.to_string())?.to_rgba8();
        Ok(ImageData {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        })
    }
}

/// Parse `#rrggbb` or `#aarrggbb` into ARGB. Anything else falls back
/// to opaque white.
pub fn parse_color(text: &str) -> u32 {
    let hex = text.trim().trim_start_matches('#');
    match (hex.len(), u32::from_str_radix(hex, 16)) {
        (6, Ok(rgb)) => 0xff00_0000 | rgb,
        (8, Ok(argb)) => argb,
        _ => DEFAULT_BAR_COLOR,
    }
}

/// Builds display-ready slides from playlist items
pub struct SlideBuilder {
    assets: Arc<AssetCache>,
    images: Arc<dyn ImageDecoder>,
}

impl SlideBuilder {
    pub fn new(assets: Arc<AssetCache>, images: Arc<dyn ImageDecoder>) -> Self {
        Self { assets, images }
    }

    /// Prepare slide `index` of `playlist`. Failures are reported through
    /// the `error` flag so a broken slide still takes its turn.
    pub fn build(&self, playlist: &Playlist, index: usize) -> Option<NewSlideData> {
        let item = playlist.items.get(index)?;
        let slide_type = item.slide_type();

        let mut slide = NewSlideData {
            playlist_id: playlist.id.clone(),
            slide_index: index,
            slide_id: item.id.clone(),
            slide_type,
            transition_id: item.transition_id,
            transition_time: item.transition_duration,
            image: None,
            overlay: None,
            mute: item.mute,
            error: false,
        };

        if slide_type == SlideType::Unknown {
            warn!("Slide '{}' has unknown type '{}'", item.id, item.item_type);
            slide.error = true;
        }

        if !item.path.is_empty() {
            match self.load_image(item) {
                Ok(image) => slide.image = Some(image),
                Err(e) => {
                    warn!("Slide '{}' image unavailable: {}", item.id, e.user_message());
                    slide.error = true;
                }
            }
        }

        if matches!(slide_type, SlideType::Bars | SlideType::Winners) {
            slide.overlay = Some(OverlayBars {
                bar_color: parse_color(&item.bar_color),
                blink_color1: parse_color(&item.bar_blink_color1),
                blink_color2: parse_color(&item.bar_blink_color2),
                alpha: item.bar_alpha.clamp(0.0, 1.0),
                positions: item.bar_positions.clone(),
                winners: slide_type == SlideType::Winners,
            });
        }

        Some(slide)
    }

    fn load_image(&self, item: &PlaylistItem) -> Result<ImageData, AssetError> {
        // prefer the reference attached by the last refresh pass
        let asset = match &item.asset {
            Some(asset) if asset.is_cached() => asset.clone(),
            _ => self.assets.get_asset(&item.path),
        };
        let bytes = self.assets.read_bytes(&asset)?;
        self.images.decode(&bytes).map_err(|reason| AssetError::ImageDecode {
            path: item.path.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::EventLog;
    use crate::models::BarRect;
    use crate::playlist::assets::FileAssetSource;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn builder(dir: &TempDir) -> SlideBuilder {
        let source = Arc::new(FileAssetSource::new(dir.path().join("source")));
        let cache = Arc::new(AssetCache::new(source, dir.path().join("cache"), 2, EventLog::new()));
        SlideBuilder::new(cache, Arc::new(RasterImageDecoder))
    }

    fn write_png(dir: &TempDir, name: &str) {
        std::fs::create_dir_all(dir.path().join("source")).unwrap();
        RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]))
            .save(dir.path().join("source").join(name))
            .unwrap();
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#102030"), 0xff10_2030);
        assert_eq!(parse_color("80102030"), 0x8010_2030);
        assert_eq!(parse_color(""), DEFAULT_BAR_COLOR);
        assert_eq!(parse_color("#zzzzzz"), DEFAULT_BAR_COLOR);
    }

    #[test]
    fn test_build_image_slide() {
        let dir = TempDir::new().unwrap();
        write_png(&dir, "a.png");
        let mut item = PlaylistItem::new("a", "image", "a.png", 5.0);
        item.transition_id = 2;
        item.mute = true;
        let playlist = Playlist::new("lobby", vec![item]);

        let slide = builder(&dir).build(&playlist, 0).unwrap();
        assert!(!slide.error);
        assert!(slide.mute);
        assert_eq!(slide.transition_id, 2);
        let image = slide.image.unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(&image.rgba[..4], &[10, 20, 30, 255]);
        assert!(slide.overlay.is_none());
    }

    #[test]
    fn test_missing_asset_flags_error() {
        let dir = TempDir::new().unwrap();
        let playlist = Playlist::new("lobby", vec![PlaylistItem::new("a", "image", "gone.png", 5.0)]);

        let slide = builder(&dir).build(&playlist, 0).unwrap();
        assert!(slide.error);
        assert!(slide.image.is_none());
        assert!(builder(&dir).build(&playlist, 1).is_none());
    }

    #[test]
    fn test_undecodable_image_flags_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("source")).unwrap();
        std::fs::write(dir.path().join("source").join("bad.png"), b"not a png").unwrap();
        let playlist = Playlist::new("lobby", vec![PlaylistItem::new("a", "image", "bad.png", 5.0)]);
        let builder = builder(&dir);

        match builder.load_image(&playlist.items[0]) {
            Err(AssetError::ImageDecode { path, .. }) => assert_eq!(path, "bad.png"),
            other => panic!("Expected ImageDecode error, got {:?}", other.map(|image| image.width)),
        }
        let slide = builder.build(&playlist, 0).unwrap();
        assert!(slide.error);
        assert!(slide.image.is_none());
    }

    #[test]
    fn test_winners_overlay() {
        let dir = TempDir::new().unwrap();
        let mut item = PlaylistItem::new("w", "winners", "", 5.0);
        item.bar_color = "#ff0000".into();
        item.bar_alpha = 3.0;
        item.bar_positions = vec![BarRect {
            x0: 0.1,
            y0: 0.2,
            x1: 0.9,
            y1: 0.3,
        }];
        let playlist = Playlist::new("lobby", vec![item]);

        let slide = builder(&dir).build(&playlist, 0).unwrap();
        assert!(!slide.error);
        let overlay = slide.overlay.unwrap();
        assert!(overlay.winners);
        assert_eq!(overlay.bar_color, 0xffff_0000);
        assert_eq!(overlay.alpha, 1.0);
        assert_eq!(overlay.positions.len(), 1);
    }
}
