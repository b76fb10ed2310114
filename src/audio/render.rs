use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{trace, warn};

use super::decoder::DecoderSession;
use super::fader::VolumeRamp;
use super::output::OutputSink;
use super::seek_buffer::{SeekBuffer, SeekCursor};
use super::StreamInfo;
use crate::logging::EventLog;

/// Ticks consuming fewer frames than this are skipped
pub const MIN_RENDER_FRAMES: usize = 32;

/// Full scale used when converting to 16 bit
const CLIP_LEVEL: f32 = 32760.0;

pub(crate) enum Source {
    Seekable { buffer: SeekBuffer, cursor: SeekCursor },
    Streaming(DecoderSession),
}

impl Source {
    pub fn info(&self) -> StreamInfo {
        match self {
            Source::Seekable { buffer, .. } => buffer.info(),
            Source::Streaming(session) => session.info(),
        }
    }
}

/// Frames written to the sink in one tick. `timeline` is false when the
/// engine was paused, so those frames do not advance the position.
#[derive(Debug, Clone, Copy)]
struct Segment {
    frames: usize,
    timeline: bool,
}

pub(crate) struct Output {
    sink: Box<dyn OutputSink>,
    last_play_pos: usize,
    refill: bool,
    queued: VecDeque<Segment>,
}

impl Output {
    fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            last_play_pos: 0,
            refill: true,
            queued: VecDeque::new(),
        }
    }

    fn consumed(&self) -> usize {
        let len = self.sink.buffer_frames();
        (len + self.sink.play_cursor() % len - self.last_play_pos) % len
    }

    /// Timeline frames written but not yet played
    fn timeline_ahead(&self) -> usize {
        if self.refill {
            return 0;
        }
        let mut played = self.consumed();
        let mut ahead = 0;
        for segment in &self.queued {
            let gone = played.min(segment.frames);
            played -= gone;
            if segment.timeline {
                ahead += segment.frames - gone;
            }
        }
        ahead
    }

    fn retire(&mut self, mut frames: usize) {
        while frames > 0 {
            let Some(front) = self.queued.front_mut() else {
                break;
            };
            if front.frames <= frames {
                frames -= front.frames;
                self.queued.pop_front();
            } else {
                front.frames -= frames;
                frames = 0;
            }
        }
    }
}

/// Render counters exposed through `AudioRenderEngine::stats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub ticks: u64,
    pub frames_rendered: u64,
    pub refills: u64,
    pub underruns: u64,
}

/// Everything the render thread and the transport calls share, guarded
/// by the engine's render lock.
pub(crate) struct RenderState {
    pub source: Option<Source>,
    output: Option<Output>,
    pub path: Option<PathBuf>,
    pub playing: bool,
    pub looping: bool,
    pub volume: VolumeRamp,
    /// Source frames consumed since the last load or seek
    pub sample_pos: u64,
    /// Silent frames rendered since the source ran dry
    pub zero_count: u64,
    scratch: Vec<f32>,
    pub stats: RenderStats,
}

impl RenderState {
    pub fn new(looping: bool) -> Self {
        Self {
            source: None,
            output: None,
            path: None,
            playing: false,
            looping,
            volume: VolumeRamp::new(1.0),
            sample_pos: 0,
            zero_count: 0,
            scratch: Vec::new(),
            stats: RenderStats::default(),
        }
    }

    pub fn info(&self) -> Option<StreamInfo> {
        self.source.as_ref().map(Source::info)
    }

    pub fn install(&mut self, source: Source, sink: Box<dyn OutputSink>, path: PathBuf) {
        self.source = Some(source);
        self.output = Some(Output::new(sink));
        self.path = Some(path);
        self.sample_pos = 0;
        self.zero_count = 0;
        self.volume.snap();
    }

    /// Detach the source and hand back the sink so it can be dropped
    /// outside the lock.
    pub fn uninstall(&mut self) -> Option<Box<dyn OutputSink>> {
        self.source = None;
        self.path = None;
        self.sample_pos = 0;
        self.zero_count = 0;
        self.output.take().map(|output| output.sink)
    }

    pub fn set_volume(&mut self, target: f32, fade_seconds: f32) {
        let rate = self.info().map_or(0, |info| info.sample_rate);
        self.volume.set_target(target, fade_seconds, rate);
    }

    pub fn seek(&mut self, seconds: f32) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        match source {
            Source::Seekable { buffer, cursor } => {
                let rate = buffer.info().sample_rate as f64;
                let frame = (f64::from(seconds.max(0.0)) * rate) as usize;
                *cursor = buffer.locate(frame);
                self.sample_pos = cursor.position() as u64;
            }
            Source::Streaming(session) => {
                // Streams can only be rewound
                if !(seconds <= 0.0) {
                    return;
                }
                if let Err(e) = session.restart() {
                    warn!("Failed to restart stream: {}", e);
                }
                self.sample_pos = 0;
            }
        }
        self.zero_count = 0;
        if let Some(output) = self.output.as_mut() {
            output.refill = true;
            output.queued.clear();
        }
    }

    pub fn position_seconds(&self) -> f32 {
        let (Some(info), Some(output)) = (self.info(), self.output.as_ref()) else {
            return 0.0;
        };
        let mut frames = (self.sample_pos + self.zero_count).saturating_sub(output.timeline_ahead() as u64);
        if let Some(Source::Seekable { buffer, .. }) = &self.source {
            // a looping buffer repeats; report the offset into it
            if self.looping && buffer.total_frames() > 0 {
                frames %= buffer.total_frames() as u64;
            }
        }
        (frames as f64 / f64::from(info.sample_rate)) as f32
    }

    /// One render pass: refill what the device played since the last pass.
    /// Returns the number of frames written to the sink.
    pub fn tick(&mut self, pending_skip: &AtomicU64, events: &EventLog) -> usize {
        let Some(channels) = self.info().map(|info| info.channels as usize) else {
            return 0;
        };
        let Some(output) = self.output.as_mut() else {
            return 0;
        };
        self.stats.ticks += 1;

        let len = output.sink.buffer_frames();
        let play = output.sink.play_cursor() % len;
        let refill = output.refill;
        let (start, todo) = if refill {
            output.refill = false;
            output.queued.clear();
            (play, len)
        } else {
            let todo = (len + play - output.last_play_pos) % len;
            if todo < MIN_RENDER_FRAMES {
                return 0;
            }
            if todo > len * 3 / 4 {
                self.stats.underruns += 1;
                events.render_underrun(todo, len);
            }
            output.retire(todo);
            (output.last_play_pos, todo)
        };

        let playing = self.playing;
        let rendered = self.render(todo, channels, pending_skip);

        let Some(output) = self.output.as_mut() else {
            return 0;
        };
        let scratch = &self.scratch;
        output.sink.write(start, todo, &mut |first, second| {
            convert(&scratch[..first.len()], first);
            convert(&scratch[first.len()..first.len() + second.len()], second);
        });
        output.queued.push_back(Segment {
            frames: todo,
            timeline: playing,
        });
        output.last_play_pos = play;

        if refill {
            self.stats.refills += 1;
        }
        self.stats.frames_rendered += rendered as u64;
        trace!("Rendered {} of {} frames at {}", rendered, todo, start);
        todo
    }

    /// Fill the scratch buffer with `frames` frames. Returns the frames that
    /// came from the source; the rest is silence.
    fn render(&mut self, frames: usize, channels: usize, pending_skip: &AtomicU64) -> usize {
        self.scratch.clear();
        self.scratch.resize(frames * channels, 0.0);

        let mut rendered = 0;
        match self.source.as_mut() {
            None => {}
            Some(Source::Seekable { buffer, cursor }) => {
                // Skipping is only meaningful when decoding on the fly
                pending_skip.store(0, Ordering::Relaxed);
                if self.playing {
                    rendered = buffer.read(cursor, &mut self.scratch);
                    // wrap to the start once the chain is exhausted
                    while rendered < frames
                        && self.looping
                        && buffer.total_frames() > 0
                        && buffer.remaining(cursor) == 0
                    {
                        *cursor = buffer.locate(0);
                        rendered += buffer.read(cursor, &mut self.scratch[rendered * channels..]);
                    }
                }
            }
            Some(Source::Streaming(session)) => {
                if self.playing {
                    let skip = pending_skip.swap(0, Ordering::Relaxed);
                    if skip > 0 {
                        match session.skip_frames(skip as usize) {
                            Ok(skipped) => self.sample_pos += skipped as u64,
                            Err(e) => warn!("Skip failed: {}", e),
                        }
                    }

                    rendered = read_or_silence(session, &mut self.scratch);
                    while rendered < frames && self.looping {
                        if let Err(e) = session.restart() {
                            warn!("Failed to restart stream for looping: {}", e);
                            break;
                        }
                        let more = read_or_silence(session, &mut self.scratch[rendered * channels..]);
                        if more == 0 {
                            break;
                        }
                        rendered += more;
                    }
                }
            }
        }
        self.sample_pos += rendered as u64;

        self.volume.apply(&mut self.scratch, channels, rendered);

        if rendered > 0 {
            self.zero_count = 0;
        }
        if self.playing {
            self.zero_count += (frames - rendered) as u64;
        }
        rendered
    }
}

fn read_or_silence(session: &mut DecoderSession, out: &mut [f32]) -> usize {
    match session.read_frames(out) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Decode error during render, treating as end of stream: {}", e);
            0
        }
    }
}

fn convert(src: &[f32], dst: &mut [i16]) {
    for (out, &sample) in dst.iter_mut().zip(src) {
        *out = (sample * CLIP_LEVEL).clamp(-CLIP_LEVEL, CLIP_LEVEL) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_clips_to_16_bit() {
        let mut out = [0i16; 4];
        convert(&[0.5, -2.0, 2.0, 0.0], &mut out);
        assert_eq!(out, [16380, -32760, 32760, 0]);
    }
}
