//! Frame loop tying the slide scheduler to the music engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::{AudioRenderEngine, StreamInfo};
use crate::cli::{CliApp, ConsoleCommand, StatusDisplay};
use crate::error::PlayerError;
use crate::logging::{EventLog, EventStatistics};
use crate::models::NewSlideData;
use crate::playlist::{CurrentSlide, InputEvent, KeyCode, PlaybackState, PlaylistScheduler};

/// Fade applied when a slide mutes or unmutes the music
pub const MUTE_FADE_SECONDS: f32 = 0.5;

/// Snapshot of music playback
#[derive(Debug, Clone, PartialEq)]
pub struct MusicStatus {
    pub path: Option<PathBuf>,
    pub position: f32,
    pub playing: bool,
    pub volume: f32,
    pub info: Option<StreamInfo>,
}

/// Snapshot of the whole player
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerStatus {
    pub state: PlaybackState,
    pub slide: Option<CurrentSlide>,
    pub slide_error: bool,
    pub muted: bool,
    pub loops: u64,
    pub held_frames: u64,
    pub music: Option<MusicStatus>,
    pub events: EventStatistics,
}

/// Owns the scheduler and the optional music engine and drives both
pub struct SignageRunner {
    scheduler: PlaylistScheduler,
    engine: Option<AudioRenderEngine>,
    volume: f32,
    muted: bool,
    current: Option<NewSlideData>,
    events: EventLog,
}

impl SignageRunner {
    pub fn new(
        scheduler: PlaylistScheduler,
        engine: Option<AudioRenderEngine>,
        volume: f32,
        events: EventLog,
    ) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        if let Some(engine) = &engine {
            engine.set_volume(volume, 0.0);
        }
        Self {
            scheduler,
            engine,
            volume,
            muted: false,
            current: None,
            events,
        }
    }

    pub fn scheduler(&self) -> &PlaylistScheduler {
        &self.scheduler
    }

    pub fn engine(&self) -> Option<&AudioRenderEngine> {
        self.engine.as_ref()
    }

    /// Slide currently on screen
    pub fn current_slide(&self) -> Option<&NewSlideData> {
        self.current.as_ref()
    }

    /// Load background music and start it
    pub fn start_music(&self, path: impl Into<PathBuf>) -> Result<(), PlayerError> {
        let engine = self.engine.as_ref().ok_or(crate::error::AudioError::EngineStopped)?;
        engine.init(path.into())?;
        engine.play();
        Ok(())
    }

    /// Advance one frame. Returns the new slide when one was switched in.
    pub fn tick(&mut self, delta: f64) -> Option<&NewSlideData> {
        let slide = self.scheduler.on_frame(delta)?;
        info!(
            "Showing slide '{}' ({} of '{}'){}",
            slide.slide_id,
            slide.slide_index,
            slide.playlist_id,
            if slide.error { " with errors" } else { "" }
        );
        self.apply_mute(slide.mute);
        self.current = Some(slide);
        self.current.as_ref()
    }

    fn apply_mute(&mut self, mute: bool) {
        if mute == self.muted {
            return;
        }
        self.muted = mute;
        if let Some(engine) = &self.engine {
            let target = if mute { 0.0 } else { self.volume };
            debug!("Fading music to {:.2}", target);
            engine.set_volume(target, MUTE_FADE_SECONDS);
        }
    }

    /// Music volume outside muted slides
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if !self.muted {
            if let Some(engine) = &self.engine {
                engine.set_volume(self.volume, MUTE_FADE_SECONDS);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Run a console command and describe the result
    pub fn execute(&mut self, command: ConsoleCommand) -> Result<String, PlayerError> {
        match command {
            ConsoleCommand::Next => Ok(self.key(KeyCode::Right, "Next slide")),
            ConsoleCommand::Prev => Ok(self.key(KeyCode::Left, "Previous slide")),
            ConsoleCommand::Home => Ok(self.key(KeyCode::Home, "Restarting playlist")),
            ConsoleCommand::Goto { playlist, slide } => {
                self.scheduler.seek(&playlist, &slide, true)?;
                Ok(format!("OK: Going to '{}' in '{}'", slide, playlist))
            }
            ConsoleCommand::Play => {
                self.music()?.play();
                Ok("OK: Music playing".to_string())
            }
            ConsoleCommand::Pause => {
                self.music()?.pause();
                Ok("OK: Music paused".to_string())
            }
            ConsoleCommand::Seek { position } => {
                self.music()?.seek(position.as_secs_f32());
                Ok(format!("OK: Music at {}", CliApp::format_duration(position)))
            }
            ConsoleCommand::Volume { level } => {
                self.set_volume(f32::from(level) / 100.0);
                Ok(format!("OK: Volume {}%", level))
            }
            ConsoleCommand::Refresh => {
                self.scheduler.refresh_assets();
                Ok("OK: Refreshing assets".to_string())
            }
            ConsoleCommand::Status => Ok(StatusDisplay::format_status(&self.status())),
        }
    }

    fn key(&self, code: KeyCode, message: &str) -> String {
        if self.scheduler.on_input(InputEvent::KeyPressed(code)) {
            format!("OK: {}", message)
        } else {
            "Nothing to do".to_string()
        }
    }

    fn music(&self) -> Result<&AudioRenderEngine, PlayerError> {
        match &self.engine {
            Some(engine) if engine.is_loaded() => Ok(engine),
            _ => Err(crate::error::AudioError::EngineStopped.into()),
        }
    }

    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            state: self.scheduler.state(),
            slide: self.scheduler.current_position(),
            slide_error: self.current.as_ref().is_some_and(|slide| slide.error),
            muted: self.muted,
            loops: self.scheduler.loop_count(),
            held_frames: self.scheduler.held_frames(),
            music: self.engine.as_ref().map(|engine| MusicStatus {
                path: engine.loaded_path(),
                position: engine.position(),
                playing: engine.is_playing(),
                volume: engine.volume(),
                info: engine.stream_info(),
            }),
            events: self.events.statistics(),
        }
    }

    /// Drive frames at `fps` until `shutdown` is set.
    /// Each command's outcome is passed to `report`.
    pub async fn run(
        &mut self,
        fps: u32,
        mut commands: UnboundedReceiver<ConsoleCommand>,
        shutdown: Arc<AtomicBool>,
        mut report: impl FnMut(Result<String, PlayerError>),
    ) {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.clamp(1, 240)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = Instant::now();
        let mut commands_open = true;

        info!("Frame loop running at {} fps", fps);
        while !shutdown.load(Ordering::Relaxed) {
            tokio::select! {
                biased;

                command = commands.recv(), if commands_open => match command {
                    Some(command) => report(self.execute(command)),
                    None => commands_open = false,
                },

                _ = interval.tick() => {
                    let now = Instant::now();
                    let delta = now.duration_since(last).as_secs_f64();
                    last = now;
                    self.tick(delta);
                }
            }
        }
        info!("Frame loop stopped");
    }

    /// Stop the engine and the scheduler threads
    pub fn shutdown(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.exit();
        }
        self.scheduler.exit();
    }
}

impl Drop for SignageRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
