use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use signage_player::audio::{AudioRenderEngine, CpalSinkFactory, DeviceManager};
use signage_player::cli::{CliApp, Commands, ConsoleCommand, ParseError, StatusDisplay};
use signage_player::config::ConfigManager;
use signage_player::error::PlayerError;
use signage_player::logging::{init_logging, EventLog};
use signage_player::playlist::{read_playlist, PlaylistScheduler, StoreDir};
use signage_player::runner::SignageRunner;

/// Main application controller that coordinates all components
struct AppController {
    config_manager: ConfigManager,
    events: EventLog,
}

impl AppController {
    fn new(config_path: Option<PathBuf>) -> Result<Self, PlayerError> {
        if std::env::var("SIGNAGE_LOG_LEVEL").is_err() {
            std::env::set_var("SIGNAGE_LOG_LEVEL", "info");
        }
        if let Err(e) = init_logging() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = match config_path {
            Some(path) => ConfigManager::open(CliApp::expand_path(&path.to_string_lossy()))?,
            None => ConfigManager::new()?,
        };
        info!("Using configuration {}", config_manager.config_path().display());

        Ok(Self {
            config_manager,
            events: EventLog::new(),
        })
    }

    async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Run {
                playlists,
                music,
                fps,
                no_audio,
                streaming,
            } => self.run(&playlists, music, fps, no_audio, streaming).await,
            Commands::Import { path } => {
                let playlist = read_playlist(&path)?;
                let config = self.config_manager.get_config();
                let mut scheduler = PlaylistScheduler::from_config(&config.scheduler, self.events.clone())?;
                let id = playlist.id.clone();
                let slides = playlist.len();
                if scheduler.add_playlist(playlist) {
                    println!("OK: Imported '{}' ({} slides)", id, slides);
                } else {
                    println!("Stored copy of '{}' is newer; nothing imported", id);
                }
                scheduler.exit();
                Ok(())
            }
            Commands::Playlists => {
                let config = self.config_manager.get_config();
                let (playlists, position) = StoreDir::new(&config.scheduler.cache_dir).load()?;
                println!("{}", StatusDisplay::format_playlists(&playlists, position.as_ref()));
                Ok(())
            }
            Commands::Devices => {
                let devices = DeviceManager::new().list_devices()?;
                println!("{}", StatusDisplay::format_devices(&devices));
                Ok(())
            }
        }
    }

    async fn run(
        &mut self,
        playlists: &[PathBuf],
        music: Option<PathBuf>,
        fps: u32,
        no_audio: bool,
        streaming: bool,
    ) -> Result<(), PlayerError> {
        let config = self.config_manager.get_config().clone();

        let scheduler = PlaylistScheduler::from_config(&config.scheduler, self.events.clone())?;
        for path in playlists {
            let playlist = read_playlist(path)?;
            info!("Adding playlist '{}' from {}", playlist.id, path.display());
            scheduler.add_playlist(playlist);
        }

        let engine = if no_audio {
            None
        } else {
            let mut engine_config = config.engine.clone();
            if streaming {
                engine_config.seekable = false;
            }
            let sinks = Arc::new(CpalSinkFactory::new(engine_config.preferred_device.clone()));
            Some(AudioRenderEngine::new(engine_config, sinks, self.events.clone())?)
        };

        let mut runner = SignageRunner::new(scheduler, engine, config.engine.default_volume, self.events.clone());
        if let Some(music) = music {
            if let Err(e) = runner.start_music(Self::resolve(&music)) {
                StatusDisplay::display_error(&e);
            }
        }

        println!("Signage player running. Type 'help' for commands, 'exit' or 'quit' to stop.");

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nReceived interrupt signal. Shutting down gracefully...");
            shutdown_flag.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ConsoleCommand>();
        let console_shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    if input == "exit" || input == "quit" {
                        console_shutdown.store(true, Ordering::Relaxed);
                        break;
                    }
                    match CliApp::parse_command(input) {
                        Ok(command) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        Err(ParseError::HelpRequested) => CliApp::display_help(),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }
            })?;

        runner
            .run(fps, rx, shutdown, |result| match result {
                Ok(message) => println!("{}", message),
                Err(e) if e.is_recoverable() => StatusDisplay::display_simple_error(&e),
                Err(e) => StatusDisplay::display_error(&e),
            })
            .await;

        println!("Shutting down...");
        let volume = runner.volume();
        runner.shutdown();
        if (volume - config.engine.default_volume).abs() > f32::EPSILON {
            if let Err(e) = self.config_manager.set_volume(volume) {
                warn!("Could not save volume: {}", e.user_message());
            }
        }
        println!("Shutdown complete.");
        Ok(())
    }

    fn resolve(path: &Path) -> PathBuf {
        CliApp::expand_path(&path.to_string_lossy())
    }
}

#[tokio::main]
async fn main() {
    let cli = CliApp::parse();

    let mut app = match AppController::new(cli.config) {
        Ok(app) => app,
        Err(e) => {
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.execute_command(cli.command).await {
        error!("{}", e);
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
}
