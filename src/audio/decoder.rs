use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::StreamInfo;
use crate::error::{AudioError, DecodeError};

/// Samples in the scratch buffer used to discard skipped audio
pub const SKIP_SCRATCH_SAMPLES: usize = 4096;

/// Container formats the engine accepts, by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    OggVorbis,
    Mp3,
    Flac,
    Wav,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, AudioError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "ogg" | "oga" => Ok(SourceFormat::OggVorbis),
            "mp3" => Ok(SourceFormat::Mp3),
            "flac" => Ok(SourceFormat::Flac),
            "wav" | "wave" => Ok(SourceFormat::Wav),
            other => Err(AudioError::UnsupportedFormat {
                format: if other.is_empty() { "(no extension)".to_string() } else { other.to_string() },
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::OggVorbis => "ogg",
            SourceFormat::Mp3 => "mp3",
            SourceFormat::Flac => "flac",
            SourceFormat::Wav => "wav",
        }
    }
}

/// Working memory owned by one decoder session.
///
/// Holds the interleaving buffer, the part of the last packet not yet
/// handed out, and the scratch space skipped frames are decoded into.
pub struct DecodeArena {
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    scratch: Vec<f32>,
}

impl Default for DecodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeArena {
    pub fn new() -> Self {
        Self {
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            scratch: vec![0.0; SKIP_SCRATCH_SAMPLES],
        }
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
    }

    fn pending(&self) -> &[f32] {
        &self.pending[self.pending_pos..]
    }
}

/// One open compressed stream producing interleaved f32 PCM on demand.
///
/// The stream is read from memory, so `restart` reopens the container
/// from the shared bytes instead of seeking.
pub struct DecoderSession {
    bytes: Arc<[u8]>,
    format: SourceFormat,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    arena: DecodeArena,
    finished: bool,
}

impl DecoderSession {
    pub fn open(bytes: Arc<[u8]>, format: SourceFormat, arena: DecodeArena) -> Result<Self, DecodeError> {
        let (reader, decoder, track_id, sample_rate, channels) = Self::open_reader(&bytes, format)?;

        let mut session = Self {
            bytes,
            format,
            reader,
            decoder,
            track_id,
            info: StreamInfo {
                sample_rate,
                channels: channels.unwrap_or(0),
            },
            arena,
            finished: false,
        };

        // Some containers only report the channel layout once a packet is decoded
        if channels.is_none() {
            if !session.decode_packet()? {
                return Err(DecodeError::CorruptedFile("stream contains no audio".to_string()));
            }
        }
        if session.info.channels == 0 {
            return Err(DecodeError::CorruptedFile("stream has no channels".to_string()));
        }

        debug!(
            "Opened {:?} stream: {} Hz, {} channels",
            session.format, session.info.sample_rate, session.info.channels
        );
        Ok(session)
    }

    #[allow(clippy::type_complexity)]
    fn open_reader(
        bytes: &Arc<[u8]>,
        format: SourceFormat,
    ) -> Result<(Box<dyn FormatReader>, Box<dyn Decoder>, u32, u32, Option<u16>), DecodeError> {
        let media_source = MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("{} probe failed: {}", format.extension(), e),
            })?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                format: "no audio track found".to_string(),
            })?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::CorruptedFile("missing sample rate".to_string()))?;
        let channels = track.codec_params.channels.map(|c| c.count() as u16);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecodeFailed(format!("Failed to create decoder: {}", e)))?;

        Ok((reader, decoder, track_id, sample_rate, channels))
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Decode into `out` (interleaved), returning the number of whole frames
    /// written. Fewer frames than requested means the stream has ended.
    pub fn read_frames(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let channels = self.info.channels as usize;
        let wanted = out.len() / channels * channels;
        let mut written = 0;

        while written < wanted {
            let pending = self.arena.pending();
            if !pending.is_empty() {
                let n = pending.len().min(wanted - written);
                out[written..written + n].copy_from_slice(&pending[..n]);
                self.arena.pending_pos += n;
                written += n;
                continue;
            }
            if self.finished || !self.decode_packet()? {
                self.finished = true;
                break;
            }
        }

        Ok(written / channels)
    }

    /// Decode and discard up to `frames` frames, returning how many were skipped.
    pub fn skip_frames(&mut self, frames: usize) -> Result<usize, DecodeError> {
        let channels = self.info.channels as usize;
        let mut scratch = std::mem::take(&mut self.arena.scratch);
        let per_pass = (scratch.len() / channels).max(1);
        if scratch.len() < channels {
            scratch.resize(channels, 0.0);
        }

        let mut skipped = 0;
        let result = loop {
            if skipped >= frames {
                break Ok(skipped);
            }
            let n = per_pass.min(frames - skipped);
            match self.read_frames(&mut scratch[..n * channels]) {
                Ok(0) => break Ok(skipped),
                Ok(read) => skipped += read,
                Err(e) => break Err(e),
            }
        };

        self.arena.scratch = scratch;
        result
    }

    /// Rewind to the beginning of the stream.
    pub fn restart(&mut self) -> Result<(), DecodeError> {
        let (reader, decoder, track_id, _, _) = Self::open_reader(&self.bytes, self.format)?;
        self.reader = reader;
        self.decoder = decoder;
        self.track_id = track_id;
        self.arena.clear();
        self.finished = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.finished && self.arena.pending().is_empty()
    }

    /// Decode the next packet of our track into the arena.
    /// Returns `false` at end of stream.
    fn decode_packet(&mut self) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to read packet: {}", err)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let needs_alloc = self
                        .arena
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count());
                    if needs_alloc {
                        self.arena.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(sample_buf) = self.arena.sample_buf.as_mut() {
                        sample_buf.copy_interleaved_ref(decoded);
                        self.arena.pending.clear();
                        self.arena.pending.extend_from_slice(sample_buf.samples());
                        self.arena.pending_pos = 0;
                    }
                    if self.info.channels == 0 {
                        self.info.channels = spec.channels.count() as u16;
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to decode packet: {}", err)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::wav_bytes;

    fn open_wav(samples: &[i16], channels: u16) -> DecoderSession {
        let bytes: Arc<[u8]> = wav_bytes(samples, channels, 8000).into();
        DecoderSession::open(bytes, SourceFormat::Wav, DecodeArena::new()).unwrap()
    }

    #[test]
    fn test_source_format_classification() {
        assert_eq!(SourceFormat::from_path(Path::new("a/b.OGG")).unwrap(), SourceFormat::OggVorbis);
        assert_eq!(SourceFormat::from_path(Path::new("x.flac")).unwrap(), SourceFormat::Flac);
        assert!(matches!(
            SourceFormat::from_path(Path::new("x.aiff")),
            Err(AudioError::UnsupportedFormat { .. })
        ));
        assert!(SourceFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_open_garbage_fails() {
        let bytes: Arc<[u8]> = vec![1u8, 2, 3, 4, 5].into();
        assert!(DecoderSession::open(bytes, SourceFormat::Wav, DecodeArena::new()).is_err());
    }

    #[test]
    fn test_read_frames_interleaved() {
        let samples: Vec<i16> = (0..200).map(|i| (i * 100) as i16).collect();
        let mut session = open_wav(&samples, 2);
        assert_eq!(session.info(), StreamInfo { sample_rate: 8000, channels: 2 });

        let mut out = vec![0.0f32; 60];
        assert_eq!(session.read_frames(&mut out).unwrap(), 30);
        assert!((out[1] - 100.0 / 32768.0).abs() < 1e-6);
        assert!((out[59] - 5900.0 / 32768.0).abs() < 1e-6);

        // remaining 70 frames, then end of stream
        let mut rest = vec![0.0f32; 400];
        assert_eq!(session.read_frames(&mut rest).unwrap(), 70);
        assert_eq!(session.read_frames(&mut rest).unwrap(), 0);
        assert!(session.is_finished());
    }

    #[test]
    fn test_restart_rewinds() {
        let samples: Vec<i16> = (0..100).map(|i| i as i16 * 10).collect();
        let mut session = open_wav(&samples, 1);

        let mut out = vec![0.0f32; 100];
        assert_eq!(session.read_frames(&mut out).unwrap(), 100);
        session.restart().unwrap();
        let mut again = vec![0.0f32; 100];
        assert_eq!(session.read_frames(&mut again).unwrap(), 100);
        assert_eq!(out, again);
    }

    #[test]
    fn test_skip_frames_uses_scratch() {
        let samples: Vec<i16> = (0..10_000).map(|i| (i % 1000) as i16).collect();
        let mut session = open_wav(&samples, 1);

        assert_eq!(session.skip_frames(5_000).unwrap(), 5_000);
        let mut out = vec![0.0f32; 1];
        session.read_frames(&mut out).unwrap();
        assert!((out[0] - 0.0).abs() < 1e-6); // sample 5000 is 5000 % 1000 == 0

        // skipping past the end stops at the end
        assert_eq!(session.skip_frames(10_000).unwrap(), 4_999);
    }
}
