//! Output sinks: a circular 16-bit buffer the device plays in a loop.
//!
//! The render thread never blocks on the device. It asks for the play
//! cursor, then overwrites the frames the device has already played.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use log::{debug, error, info};

use super::device::DeviceManager;
use super::StreamInfo;
use crate::error::AudioError;
use crate::sync::{lock, CancellationToken};

/// Circular buffer backing an output.
pub trait OutputSink: Send {
    /// Length of the circular buffer in frames
    fn buffer_frames(&self) -> usize;

    /// Frame index the device will play next
    fn play_cursor(&self) -> usize;

    /// Overwrite `frames` frames starting at `start`. `fill` receives the
    /// region up to the end of the buffer and the wrapped region (possibly empty).
    fn write(&mut self, start: usize, frames: usize, fill: &mut dyn FnMut(&mut [i16], &mut [i16]));
}

/// Opens a sink for a decoded stream's format.
pub trait SinkFactory: Send + Sync {
    fn open(&self, info: StreamInfo, buffer_frames: usize) -> Result<Box<dyn OutputSink>, AudioError>;
}

/// Shared sample storage and read cursor.
#[derive(Debug)]
pub struct SinkRing {
    samples: Mutex<Vec<i16>>,
    read_frame: AtomicUsize,
    played: AtomicU64,
    frames: usize,
    channels: usize,
}

impl SinkRing {
    pub fn new(frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let frames = frames.max(1);
        Self {
            samples: Mutex::new(vec![0; frames * channels]),
            read_frame: AtomicUsize::new(0),
            played: AtomicU64::new(0),
            frames,
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn play_cursor(&self) -> usize {
        self.read_frame.load(Ordering::Acquire)
    }

    /// Frames handed to the device since creation
    pub fn frames_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    pub fn write(&self, start: usize, frames: usize, fill: &mut dyn FnMut(&mut [i16], &mut [i16])) {
        let frames = frames.min(self.frames);
        let start = start % self.frames;
        let first = frames.min(self.frames - start);
        let second = frames - first;

        let mut samples = lock(&self.samples);
        let (head, tail) = samples.split_at_mut(start * self.channels);
        let region1 = &mut tail[..first * self.channels];
        let region2 = &mut head[..second * self.channels];
        fill(region1, region2);
    }

    /// Copy `out.len() / channels` frames from the cursor, wrapping, and advance it.
    ///
    /// Runs on the device callback and never blocks: while the render thread
    /// holds the ring the callback outputs silence and the cursor stays put.
    pub fn read_into<T>(&self, out: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<i16>,
    {
        let samples = match self.samples.try_lock() {
            Ok(samples) => samples,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(T::EQUILIBRIUM);
                return;
            }
        };
        let mut frame = self.read_frame.load(Ordering::Acquire);
        let frames = out.len() / self.channels;

        for out_frame in out.chunks_exact_mut(self.channels) {
            let base = frame * self.channels;
            for (ch, sample) in out_frame.iter_mut().enumerate() {
                *sample = T::from_sample(samples[base + ch]);
            }
            frame = (frame + 1) % self.frames;
        }

        self.read_frame.store(frame, Ordering::Release);
        self.played.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Move the cursor as if the device had played `frames` frames
    pub fn advance(&self, frames: usize) {
        let _guard = lock(&self.samples);
        let frame = (self.read_frame.load(Ordering::Acquire) + frames) % self.frames;
        self.read_frame.store(frame, Ordering::Release);
        self.played.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Copy of the buffer contents
    pub fn snapshot(&self) -> Vec<i16> {
        lock(&self.samples).clone()
    }
}

/// Sink played by a cpal output stream.
///
/// `cpal::Stream` is not `Send`, so the stream lives on its own thread for
/// as long as the sink exists.
pub struct CpalSink {
    ring: Arc<SinkRing>,
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    fn start(device: cpal::Device, info: StreamInfo, buffer_frames: usize) -> Result<Self, AudioError> {
        let ring = Arc::new(SinkRing::new(buffer_frames, info.channels));
        let stop = CancellationToken::new();

        let sample_format = device
            .default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?
            .sample_format();

        let config = StreamConfig {
            channels: info.channels,
            sample_rate: SampleRate(info.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let thread_ring = ring.clone();
        let thread_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::F32 => Self::create_stream::<f32>(&device, &config, &thread_ring),
                    SampleFormat::I16 => Self::create_stream::<i16>(&device, &config, &thread_ring),
                    SampleFormat::U16 => Self::create_stream::<u16>(&device, &config, &thread_ring),
                    other => Err(AudioError::UnsupportedFormat {
                        format: format!("device sample format {:?}", other),
                    }),
                };

                let stream = match stream.and_then(|stream| {
                    stream
                        .play()
                        .map(|_| stream)
                        .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while !thread_stop.is_cancelled() {
                    thread::sleep(Duration::from_millis(10));
                }
                let _ = stream.pause();
                debug!("Output stream closed");
            })
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                ring,
                stop,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::InitializationFailed("output thread exited during startup".to_string()))
            }
        }
    }

    fn create_stream<T>(device: &cpal::Device, config: &StreamConfig, ring: &Arc<SinkRing>) -> Result<Stream, AudioError>
    where
        T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16> + Send + 'static,
    {
        let ring = Arc::clone(ring);
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| ring.read_into(data),
                move |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
    }
}

impl OutputSink for CpalSink {
    fn buffer_frames(&self) -> usize {
        self.ring.frames()
    }

    fn play_cursor(&self) -> usize {
        self.ring.play_cursor()
    }

    fn write(&mut self, start: usize, frames: usize, fill: &mut dyn FnMut(&mut [i16], &mut [i16])) {
        self.ring.write(start, frames, fill)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Opens [`CpalSink`]s on the configured device
pub struct CpalSinkFactory {
    preferred_device: Option<String>,
}

impl CpalSinkFactory {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, info: StreamInfo, buffer_frames: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        let device = DeviceManager::new().select_device_with_fallback(self.preferred_device.as_deref())?;
        info!(
            "Opening output on '{}': {} Hz, {} channels, {} frame buffer",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            info.sample_rate,
            info.channels,
            buffer_frames
        );
        Ok(Box::new(CpalSink::start(device, info, buffer_frames)?))
    }
}

/// Sink without a device. The cursor is either moved by hand through
/// [`SinkRing::advance`] or follows the wall clock.
pub struct MemorySink {
    ring: Arc<SinkRing>,
    clock: Option<(Instant, u32)>,
}

impl MemorySink {
    pub fn manual(info: StreamInfo, buffer_frames: usize) -> Self {
        Self {
            ring: Arc::new(SinkRing::new(buffer_frames, info.channels)),
            clock: None,
        }
    }

    pub fn realtime(info: StreamInfo, buffer_frames: usize) -> Self {
        Self {
            ring: Arc::new(SinkRing::new(buffer_frames, info.channels)),
            clock: Some((Instant::now(), info.sample_rate)),
        }
    }

    pub fn ring(&self) -> Arc<SinkRing> {
        self.ring.clone()
    }
}

impl OutputSink for MemorySink {
    fn buffer_frames(&self) -> usize {
        self.ring.frames()
    }

    fn play_cursor(&self) -> usize {
        match self.clock {
            Some((started, rate)) => {
                let played = (started.elapsed().as_secs_f64() * f64::from(rate)) as u64;
                (played % self.ring.frames() as u64) as usize
            }
            None => self.ring.play_cursor(),
        }
    }

    fn write(&mut self, start: usize, frames: usize, fill: &mut dyn FnMut(&mut [i16], &mut [i16])) {
        self.ring.write(start, frames, fill)
    }
}

/// Factory for [`MemorySink`]s; keeps the ring of every sink it opened.
#[derive(Default)]
pub struct MemorySinkFactory {
    realtime: bool,
    opened: Mutex<Vec<Arc<SinkRing>>>,
}

impl MemorySinkFactory {
    /// Sinks whose cursor only moves through [`SinkRing::advance`]
    pub fn manual() -> Self {
        Self::default()
    }

    /// Sinks that consume frames at the stream's sample rate
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn last_opened(&self) -> Option<Arc<SinkRing>> {
        lock(&self.opened).last().cloned()
    }

    pub fn opened_count(&self) -> usize {
        lock(&self.opened).len()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, info: StreamInfo, buffer_frames: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        let sink = if self.realtime {
            MemorySink::realtime(info, buffer_frames)
        } else {
            MemorySink::manual(info, buffer_frames)
        };
        lock(&self.opened).push(sink.ring());
        Ok(Box::new(sink))
    }
}
