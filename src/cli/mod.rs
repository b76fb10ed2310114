use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::StatusDisplay;

/// Digital signage player
#[derive(Debug, Parser)]
#[command(name = "signage")]
#[command(about = "Plays image playlists with optional background music")]
#[command(version)]
pub struct CliApp {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play the persisted playlists plus any given on the command line
    Run {
        /// Playlist JSON file to add before starting
        #[arg(long = "playlist", value_name = "FILE")]
        playlists: Vec<PathBuf>,
        /// Background music file
        #[arg(long, value_name = "FILE")]
        music: Option<PathBuf>,
        /// Frames per second driving the slide scheduler
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Do not open an audio device
        #[arg(long)]
        no_audio: bool,
        /// Decode music while playing instead of up front
        #[arg(long)]
        streaming: bool,
    },
    /// Validate a playlist file and store it for the next run
    Import {
        /// Playlist JSON file
        path: PathBuf,
    },
    /// List stored playlists and the saved position
    Playlists,
    /// List audio output devices
    Devices,
}

/// Commands typed at the console while running
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Show the next slide now
    Next,
    /// Show the previous slide now
    Prev,
    /// Restart the current playlist
    Home,
    /// Jump to a slide by id
    Goto { playlist: String, slide: String },
    /// Start or resume music
    Play,
    /// Pause music
    Pause,
    /// Seek music
    Seek { position: Duration },
    /// Music volume (0-100)
    Volume { level: u8 },
    /// Re-check assets against their source now
    Refresh,
    Status,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse a console line
    pub fn parse_command(input: &str) -> Result<ConsoleCommand, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        let Some(&command) = args.first() else {
            return Err(ParseError::EmptyCommand);
        };

        match command {
            "next" | "n" => Ok(ConsoleCommand::Next),
            "prev" | "previous" | "p" => Ok(ConsoleCommand::Prev),
            "home" => Ok(ConsoleCommand::Home),
            "goto" => match args.as_slice() {
                [_, playlist, slide] => Ok(ConsoleCommand::Goto {
                    playlist: playlist.to_string(),
                    slide: slide.to_string(),
                }),
                [_, _] => Err(ParseError::MissingArgument {
                    command: "goto".to_string(),
                    argument: "slide".to_string(),
                }),
                _ => Err(ParseError::MissingArgument {
                    command: "goto".to_string(),
                    argument: "playlist".to_string(),
                }),
            },
            "play" => Ok(ConsoleCommand::Play),
            "pause" => Ok(ConsoleCommand::Pause),
            "seek" => match args.get(1) {
                Some(position) => Ok(ConsoleCommand::Seek {
                    position: Self::parse_time(position)?,
                }),
                None => Err(ParseError::MissingArgument {
                    command: "seek".to_string(),
                    argument: "position".to_string(),
                }),
            },
            "volume" => {
                let Some(value) = args.get(1) else {
                    return Err(ParseError::MissingArgument {
                        command: "volume".to_string(),
                        argument: "level".to_string(),
                    });
                };
                match value.parse::<u8>() {
                    Ok(level) if level <= 100 => Ok(ConsoleCommand::Volume { level }),
                    Ok(_) => Err(ParseError::InvalidArgument {
                        argument: "volume level".to_string(),
                        value: value.to_string(),
                        expected: "0-100".to_string(),
                    }),
                    Err(_) => Err(ParseError::InvalidArgument {
                        argument: "volume level".to_string(),
                        value: value.to_string(),
                        expected: "number 0-100".to_string(),
                    }),
                }
            }
            "refresh" => Ok(ConsoleCommand::Refresh),
            "status" => Ok(ConsoleCommand::Status),
            "help" => Err(ParseError::HelpRequested),
            other => Err(ParseError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("Signage Player - Console Commands:");
        println!();
        println!("Slides:");
        println!("  next, n                  - Show the next slide now");
        println!("  prev, p                  - Show the previous slide now");
        println!("  home                     - Restart the current playlist");
        println!("  goto <playlist> <slide>  - Jump to a slide by id");
        println!("  refresh                  - Re-check assets now");
        println!();
        println!("Music:");
        println!("  play                     - Start or resume music");
        println!("  pause                    - Pause music");
        println!("  seek <time>              - Seek music (e.g., '1:30', '90s')");
        println!("  volume <0-100>           - Set music volume");
        println!();
        println!("General:");
        println!("  status                   - Show player status");
        println!("  help                     - Show this help message");
        println!("  exit, quit               - Stop the player");
    }

    /// Parse time string ("1:30", "90", "90s", "1:30.5") to Duration
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed.contains(':') {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() != 2 {
                return Err(invalid());
            }
            let minutes: u64 = parts[0].parse().map_err(|_| invalid())?;
            let seconds: f64 = parts[1].parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            Ok(Duration::from_secs_f64(minutes as f64 * 60.0 + seconds))
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid());
            }
            Ok(Duration::from_secs_f64(seconds))
        }
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Help requested")]
    HelpRequested,
}

#[cfg(test)]
mod tests;
