pub mod decoder;
pub mod device;
pub mod engine;
pub mod fader;
pub mod output;
mod render;
pub mod seek_buffer;

#[cfg(test)]
pub mod tests;

pub use decoder::{DecodeArena, DecoderSession, SourceFormat};
pub use device::{DeviceManager, DeviceSummary};
pub use engine::AudioRenderEngine;
pub use fader::VolumeRamp;
pub use output::{CpalSinkFactory, MemorySink, MemorySinkFactory, OutputSink, SinkFactory, SinkRing};
pub use render::{RenderStats, MIN_RENDER_FRAMES};
pub use seek_buffer::{SeekBuffer, SeekCursor, SEEK_CHUNK_FRAMES};

/// Format of a decoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamInfo {
    pub fn describe(&self) -> String {
        format!("{} Hz, {} channels", self.sample_rate, self.channels)
    }
}
