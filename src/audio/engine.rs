use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use super::decoder::{DecodeArena, DecoderSession, SourceFormat};
use super::output::SinkFactory;
use super::render::{RenderState, RenderStats, Source};
use super::seek_buffer::SeekBuffer;
use super::StreamInfo;
use crate::config::EngineConfig;
use crate::error::{AudioError, PlayerError};
use crate::logging::EventLog;
use crate::sync::{lock, CancellationToken, Signal};

/// How often the init thread re-checks for shutdown while idle
const INIT_POLL: Duration = Duration::from_millis(100);

enum LoadRequest {
    Open(PathBuf),
    Unload,
}

struct RenderThread {
    stop: CancellationToken,
    wake: Arc<Signal>,
    handle: JoinHandle<()>,
}

impl RenderThread {
    fn stop(self) {
        self.stop.cancel();
        self.wake.set();
        if self.handle.join().is_err() {
            error!("Render thread panicked");
        }
    }
}

struct EngineShared {
    config: EngineConfig,
    sinks: Arc<dyn SinkFactory>,
    events: EventLog,
    render: Mutex<RenderState>,
    request: Mutex<Option<LoadRequest>>,
    request_signal: Signal,
    render_thread: Mutex<Option<RenderThread>>,
    pending_skip: AtomicU64,
    loads: AtomicU64,
    cancel: CancellationToken,
}

/// Streaming audio player: an init thread that opens sources off the
/// caller's thread and a render thread that keeps the output buffer full.
///
/// All transport calls are cheap and take the render lock, so they are
/// serialized against render ticks.
pub struct AudioRenderEngine {
    shared: Arc<EngineShared>,
    init_thread: Option<JoinHandle<()>>,
}

impl AudioRenderEngine {
    pub fn new(config: EngineConfig, sinks: Arc<dyn SinkFactory>, events: EventLog) -> Result<Self, AudioError> {
        let shared = Arc::new(EngineShared {
            render: Mutex::new(RenderState::new(config.looping)),
            config,
            sinks,
            events,
            request: Mutex::new(None),
            request_signal: Signal::new(),
            render_thread: Mutex::new(None),
            pending_skip: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let init_thread = thread::Builder::new()
            .name("audio-init".to_string())
            .spawn(move || thread_shared.init_loop())
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create init thread: {}", e)))?;

        Ok(Self {
            shared,
            init_thread: Some(init_thread),
        })
    }

    /// Queue `path` for loading. Validation happens here; decoding happens
    /// on the init thread, and a newer call replaces a request not yet started.
    pub fn init(&self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        if self.shared.cancel.is_cancelled() {
            return Err(AudioError::EngineStopped);
        }
        let path = path.as_ref();
        let display = path.display().to_string();
        if path.as_os_str().is_empty() {
            return Err(AudioError::EmptySource { path: display });
        }
        let metadata = std::fs::metadata(path).map_err(|_| AudioError::SourceNotFound { path: display.clone() })?;
        if !metadata.is_file() {
            return Err(AudioError::SourceNotFound { path: display });
        }
        if metadata.len() == 0 {
            return Err(AudioError::EmptySource { path: display });
        }

        self.shared.pending_skip.store(0, Ordering::Relaxed);
        self.shared.request(LoadRequest::Open(path.to_path_buf()));
        Ok(())
    }

    /// Stop output and release the current source
    pub fn unload(&self) {
        self.shared.request(LoadRequest::Unload);
    }

    pub fn play(&self) {
        lock(&self.shared.render).playing = true;
    }

    pub fn pause(&self) {
        lock(&self.shared.render).playing = false;
    }

    /// Jump to `seconds`. Streaming sources only support rewinding (`seconds <= 0`).
    pub fn seek(&self, seconds: f32) {
        lock(&self.shared.render).seek(seconds);
    }

    /// Discard the next `frames` frames of a streaming source
    pub fn skip_samples(&self, frames: u32) {
        self.shared.pending_skip.fetch_add(u64::from(frames), Ordering::Relaxed);
    }

    pub fn set_volume(&self, target: f32, fade_seconds: f32) {
        lock(&self.shared.render).set_volume(target, fade_seconds);
    }

    pub fn set_loop(&self, looping: bool) {
        lock(&self.shared.render).looping = looping;
    }

    /// Playback position in seconds, excluding audio still queued in the output
    pub fn position(&self) -> f32 {
        lock(&self.shared.render).position_seconds()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.shared.render).playing
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.shared.render).source.is_some()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        lock(&self.shared.render).info()
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        lock(&self.shared.render).path.clone()
    }

    pub fn volume(&self) -> f32 {
        lock(&self.shared.render).volume.current()
    }

    pub fn stats(&self) -> RenderStats {
        lock(&self.shared.render).stats.clone()
    }

    /// Number of sources installed since creation
    pub fn load_count(&self) -> u64 {
        self.shared.loads.load(Ordering::SeqCst)
    }

    /// Block until `load_count()` reaches `count` or `timeout` elapses
    pub fn wait_for_loads(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.load_count() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Run one render pass on the calling thread
    pub(crate) fn render_now(&self) -> usize {
        lock(&self.shared.render).tick(&self.shared.pending_skip, &self.shared.events)
    }

    /// Stop all threads and release the output. Idempotent.
    pub fn exit(&mut self) {
        self.shared.cancel.cancel();
        self.shared.request_signal.set();
        if let Some(handle) = self.init_thread.take() {
            if handle.join().is_err() {
                error!("Audio init thread panicked");
            }
        }
    }
}

impl Drop for AudioRenderEngine {
    fn drop(&mut self) {
        self.exit();
    }
}

impl EngineShared {
    fn request(&self, request: LoadRequest) {
        *lock(&self.request) = Some(request);
        self.request_signal.set();
    }

    fn init_loop(self: Arc<Self>) {
        loop {
            let signalled = self.request_signal.wait_timeout(INIT_POLL);
            if self.cancel.is_cancelled() {
                break;
            }
            if !signalled {
                continue;
            }
            let Some(request) = lock(&self.request).take() else {
                continue;
            };
            match request {
                LoadRequest::Open(path) => self.load(&path),
                LoadRequest::Unload => {
                    self.teardown();
                    info!("Audio unloaded");
                }
            }
        }
        self.teardown();
        debug!("Audio init thread finished");
    }

    fn load(self: &Arc<Self>, path: &Path) {
        let started = Instant::now();
        let display = path.display().to_string();

        let source = match self.open_source(path) {
            Ok(source) => source,
            Err(e) => {
                self.events.audio_load_failed(&display, &e.to_string());
                return;
            }
        };

        // A newer request arrived while decoding
        if lock(&self.request).is_some() {
            debug!("Discarding superseded load of {}", display);
            return;
        }

        let info = source.info();
        let sink = match self.sinks.open(info, self.config.buffer_frames(info.sample_rate)) {
            Ok(sink) => sink,
            Err(e) => {
                self.events.audio_load_failed(&display, &e.to_string());
                return;
            }
        };

        self.teardown();
        lock(&self.render).install(source, sink, path.to_path_buf());

        if let Err(e) = self.start_render_thread() {
            self.events.audio_load_failed(&display, &e.to_string());
            self.teardown();
            return;
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        self.events.audio_loaded(
            &display,
            &format!(
                "{} Hz, {} ch, {} in {:.0?}",
                info.sample_rate,
                info.channels,
                if self.config.seekable { "seekable" } else { "streaming" },
                started.elapsed()
            ),
        );
    }

    fn open_source(&self, path: &Path) -> Result<Source, PlayerError> {
        let format = SourceFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(AudioError::EmptySource {
                path: path.display().to_string(),
            }
            .into());
        }

        let mut session = DecoderSession::open(bytes.into(), format, DecodeArena::new())?;
        if self.config.seekable {
            let buffer = SeekBuffer::build(&mut session, self.config.chunk_frames)?;
            Ok(Source::Seekable {
                buffer,
                cursor: Default::default(),
            })
        } else {
            Ok(Source::Streaming(session))
        }
    }

    fn start_render_thread(self: &Arc<Self>) -> Result<(), AudioError> {
        let stop = CancellationToken::new();
        let wake = Arc::new(Signal::new());
        let tick = self.config.tick_interval();

        let shared = Arc::clone(self);
        let thread_stop = stop.clone();
        let thread_wake = Arc::clone(&wake);
        let handle = thread::Builder::new()
            .name("audio-render".to_string())
            .spawn(move || {
                // Set high priority for the render thread (platform-specific)
                #[cfg(target_os = "macos")]
                unsafe {
                    let thread = libc::pthread_self();
                    let mut policy: libc::c_int = 0;
                    let mut param: libc::sched_param = std::mem::zeroed();

                    if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
                        param.sched_priority = 63;
                        let _ = libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param);
                    }
                }

                while !thread_stop.is_cancelled() && !shared.cancel.is_cancelled() {
                    thread_wake.wait_timeout(tick);
                    if thread_stop.is_cancelled() {
                        break;
                    }
                    lock(&shared.render).tick(&shared.pending_skip, &shared.events);
                }
            })
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create render thread: {}", e)))?;

        *lock(&self.render_thread) = Some(RenderThread { stop, wake, handle });
        Ok(())
    }

    /// Stop the render thread and drop the current source and sink
    fn teardown(&self) {
        let thread = lock(&self.render_thread).take();
        if let Some(thread) = thread {
            thread.stop();
        }
        let sink = lock(&self.render).uninstall();
        drop(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::MemorySinkFactory;

    fn engine() -> AudioRenderEngine {
        AudioRenderEngine::new(EngineConfig::default(), Arc::new(MemorySinkFactory::manual()), EventLog::new()).unwrap()
    }

    #[test]
    fn test_init_rejects_empty_path() {
        let engine = engine();
        assert!(matches!(engine.init(""), Err(AudioError::EmptySource { .. })));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_init_rejects_missing_and_empty_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = engine();
        assert!(matches!(
            engine.init(dir.path().join("missing.ogg")),
            Err(AudioError::SourceNotFound { .. })
        ));

        let empty = dir.path().join("empty.ogg");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(engine.init(&empty), Err(AudioError::EmptySource { .. })));
        assert!(matches!(engine.init(dir.path()), Err(AudioError::SourceNotFound { .. })));
    }

    #[test]
    fn test_transport_without_source_is_harmless() {
        let engine = engine();
        engine.play();
        engine.seek(3.0);
        engine.skip_samples(100);
        engine.set_volume(0.5, 0.0);
        assert!(engine.is_playing());
        assert_eq!(engine.position(), 0.0);
        assert_eq!(engine.volume(), 0.5);
        assert_eq!(engine.render_now(), 0);
        assert!(engine.stream_info().is_none());
    }

    #[test]
    fn test_exit_is_idempotent() {
        let mut engine = engine();
        engine.exit();
        engine.exit();
        assert!(matches!(engine.init("x.ogg"), Err(AudioError::EngineStopped)));
    }
}
