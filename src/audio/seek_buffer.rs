//! Fully decoded, chunked sample store for sample-accurate seeking.
//!
//! The source is decoded once, up front, into a chain of fixed-capacity
//! chunks. Only the last chunk may be shorter than the capacity; a short read
//! is how the end of the stream is detected while building.

use log::debug;

use super::decoder::DecoderSession;
use super::StreamInfo;
use crate::error::DecodeError;

/// Default chunk capacity in frames
pub const SEEK_CHUNK_FRAMES: usize = 1_000_000;

#[derive(Debug)]
struct SeekChunk {
    samples: Vec<f32>,
    frames: usize,
}

/// Read position inside a [`SeekBuffer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekCursor {
    chunk: usize,
    offset: usize,
    position: usize,
}

impl SeekCursor {
    /// Absolute frame index
    pub fn position(&self) -> usize {
        self.position
    }
}

pub struct SeekBuffer {
    chunks: Vec<SeekChunk>,
    total_frames: usize,
    info: StreamInfo,
}

impl SeekBuffer {
    /// Decode `session` to the end.
    pub fn build(session: &mut DecoderSession, chunk_frames: usize) -> Result<Self, DecodeError> {
        let info = session.info();
        let channels = info.channels as usize;
        let chunk_frames = chunk_frames.max(1);
        let mut chunks = Vec::new();
        let mut total_frames = 0;

        loop {
            let mut samples = vec![0.0f32; chunk_frames * channels];
            let frames = session.read_frames(&mut samples)?;
            if frames > 0 {
                samples.truncate(frames * channels);
                samples.shrink_to_fit();
                chunks.push(SeekChunk { samples, frames });
                total_frames += frames;
            }
            if frames < chunk_frames {
                break;
            }
        }

        debug!(
            "Seek buffer built: {} frames in {} chunks of {}",
            total_frames,
            chunks.len(),
            chunk_frames
        );

        Ok(Self {
            chunks,
            total_frames,
            info,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Frame count of each chunk, in chain order
    #[cfg(test)]
    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.chunks.iter().map(|chunk| chunk.frames).collect()
    }

    pub fn remaining(&self, cursor: &SeekCursor) -> usize {
        self.total_frames - cursor.position
    }

    /// Cursor at `frame`, clamped to the end of the buffer.
    pub fn locate(&self, frame: usize) -> SeekCursor {
        let frame = frame.min(self.total_frames);
        let mut left = frame;
        for (index, chunk) in self.chunks.iter().enumerate() {
            if left < chunk.frames {
                return SeekCursor {
                    chunk: index,
                    offset: left,
                    position: frame,
                };
            }
            left -= chunk.frames;
        }
        SeekCursor {
            chunk: self.chunks.len(),
            offset: 0,
            position: frame,
        }
    }

    /// Copy interleaved frames into `out` starting at `cursor`, crossing chunk
    /// boundaries. Returns the frames copied, short at the end of the chain.
    pub fn read(&self, cursor: &mut SeekCursor, out: &mut [f32]) -> usize {
        let channels = self.info.channels as usize;
        let wanted = out.len() / channels;
        let mut done = 0;

        while done < wanted {
            let Some(chunk) = self.chunks.get(cursor.chunk) else {
                break;
            };
            let n = (chunk.frames - cursor.offset).min(wanted - done);
            let src = &chunk.samples[cursor.offset * channels..(cursor.offset + n) * channels];
            out[done * channels..(done + n) * channels].copy_from_slice(src);
            done += n;
            cursor.offset += n;
            cursor.position += n;
            if cursor.offset == chunk.frames {
                cursor.chunk += 1;
                cursor.offset = 0;
            }
        }

        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::{DecodeArena, SourceFormat};
    use crate::audio::tests::wav_bytes;
    use std::sync::Arc;

    fn ramp_session(frames: usize, channels: u16) -> DecoderSession {
        let samples: Vec<i16> = (0..frames * channels as usize).map(|i| (i % 30000) as i16).collect();
        let bytes: Arc<[u8]> = wav_bytes(&samples, channels, 8000).into();
        DecoderSession::open(bytes, SourceFormat::Wav, DecodeArena::new()).unwrap()
    }

    #[test]
    fn test_chunk_lengths_sum_to_decoded_length() {
        let buffer = SeekBuffer::build(&mut ramp_session(2_500, 2), 1_000).unwrap();
        assert_eq!(buffer.chunk_lengths(), vec![1_000, 1_000, 500]);
        assert_eq!(buffer.total_frames(), 2_500);

        // end-to-end decode of the same stream agrees
        let mut session = ramp_session(2_500, 2);
        let mut all = vec![0.0f32; 10_000];
        assert_eq!(session.read_frames(&mut all).unwrap(), 2_500);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_chunk() {
        let buffer = SeekBuffer::build(&mut ramp_session(2_000, 1), 1_000).unwrap();
        assert_eq!(buffer.chunk_lengths(), vec![1_000, 1_000]);
        assert_eq!(buffer.total_frames(), 2_000);
    }

    #[test]
    fn test_read_across_chunks() {
        let buffer = SeekBuffer::build(&mut ramp_session(2_500, 1), 1_000).unwrap();
        let mut cursor = buffer.locate(990);
        let mut out = vec![0.0f32; 20];
        assert_eq!(buffer.read(&mut cursor, &mut out), 20);
        assert_eq!(cursor.position(), 1_010);
        assert!((out[0] - 990.0 / 32768.0).abs() < 1e-6);
        assert!((out[19] - 1009.0 / 32768.0).abs() < 1e-6);
        assert_eq!(buffer.remaining(&cursor), 1_490);
    }

    #[test]
    fn test_read_stops_at_end() {
        let buffer = SeekBuffer::build(&mut ramp_session(1_500, 1), 1_000).unwrap();
        let mut cursor = buffer.locate(1_400);
        let mut out = vec![1.0f32; 300];
        assert_eq!(buffer.read(&mut cursor, &mut out), 100);
        assert_eq!(buffer.remaining(&cursor), 0);
        assert_eq!(buffer.read(&mut cursor, &mut out), 0);
    }

    #[test]
    fn test_locate_clamps() {
        let buffer = SeekBuffer::build(&mut ramp_session(1_500, 1), 1_000).unwrap();
        assert_eq!(buffer.locate(99_999).position(), 1_500);
        assert_eq!(buffer.locate(1_000).position(), 1_000);
        let mut cursor = buffer.locate(1_000);
        let mut out = vec![0.0f32; 1];
        buffer.read(&mut cursor, &mut out);
        assert!((out[0] - 1000.0 / 32768.0).abs() < 1e-6);
    }
}
