pub mod assets;
pub mod input;
pub mod prepare;
pub mod scheduler;
pub mod store;

pub use assets::{AssetCache, AssetSource, FileAssetSource};
pub use input::{InputEvent, KeyCode};
pub use prepare::{parse_color, ImageDecoder, RasterImageDecoder, SlideBuilder};
pub use scheduler::{CurrentSlide, PlaybackState, PlaylistScheduler};
pub use store::{read_playlist, PlaylistStore, StoreDir};
