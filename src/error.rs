use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Playlist error: {0}")]
    Playlist(#[from] PlaylistError),
}

impl PlayerError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Asset(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Playlist(err) => err.user_message(),
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Decode(_) => false,
            PlayerError::Asset(_) => true, // retried by the next refresh pass
            PlayerError::Config(_) => true,
            PlayerError::Playlist(err) => err.is_recoverable(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(AudioError::EngineStopped) => ErrorSeverity::Info,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Decode(DecodeError::UnsupportedFormat { .. }) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            PlayerError::Asset(_) => ErrorSeverity::Warning,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Playlist(PlaylistError::PlaylistNotFound { .. }) => ErrorSeverity::Info,
            PlayerError::Playlist(_) => ErrorSeverity::Warning,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::InvalidData => "File contains invalid or corrupted data".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio engine and output errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio source not found: {path}")]
    SourceNotFound { path: String },

    #[error("Audio source is empty: {path}")]
    EmptySource { path: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Audio engine has been shut down")]
    EngineStopped,
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported", format)
            }
            AudioError::SourceNotFound { path } => {
                format!("Cannot find audio file: {}", path)
            }
            AudioError::EmptySource { path } if path.is_empty() => {
                "No audio file was given".to_string()
            }
            AudioError::EmptySource { path } => {
                format!("Audio file '{}' contains no data", path)
            }
            AudioError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio output: {}", msg)
            }
            AudioError::EngineStopped => "The audio engine is no longer running".to_string(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // falls back to the default device
            AudioError::UnsupportedFormat { .. } => false,
            AudioError::SourceNotFound { .. } => false,
            AudioError::EmptySource { .. } => false,
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => true,
            AudioError::EngineStopped => false,
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported by this player", format)
            }
            DecodeError::CorruptedFile(msg) => {
                format!("Audio file appears to be corrupted or damaged: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => {
                format!("Failed to decode audio data: {}", msg)
            }
        }
    }
}

/// Asset fetch and slide preparation errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset not found: {path}")]
    NotFound { path: String },

    #[error("Asset {path} is not cached")]
    NotCached { path: String },

    #[error("Image decode failed for {path}: {reason}")]
    ImageDecode { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AssetError {
    pub fn user_message(&self) -> String {
        match self {
            AssetError::NotFound { path } => format!("Media file '{}' does not exist on the source", path),
            AssetError::NotCached { path } => format!("Media file '{}' has not been downloaded yet", path),
            AssetError::ImageDecode { path, .. } => format!("Image '{}' could not be decoded", path),
            AssetError::IoError(err) => format!("Cannot access media cache: {}", err),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }
}

/// Playlist store and scheduler errors
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("Playlist not found: {id}")]
    PlaylistNotFound { id: String },

    #[error("Slide {slide} not found in playlist {playlist}")]
    SlideNotFound { playlist: String, slide: String },

    #[error("Invalid playlist format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlaylistError {
    pub fn user_message(&self) -> String {
        match self {
            PlaylistError::PlaylistNotFound { id } => {
                format!("Playlist '{}' does not exist", id)
            }
            PlaylistError::SlideNotFound { playlist, slide } => {
                format!("Playlist '{}' has no slide '{}'", playlist, slide)
            }
            PlaylistError::InvalidFormat(msg) => {
                format!("Playlist file has invalid format: {}", msg)
            }
            PlaylistError::IoError(err) => {
                format!("Cannot access playlist storage: {}", err)
            }
            PlaylistError::Serialization(err) => {
                format!("Playlist record is malformed: {}", err)
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            PlaylistError::PlaylistNotFound { .. } => true,
            PlaylistError::SlideNotFound { .. } => true,
            PlaylistError::InvalidFormat(_) => false,
            PlaylistError::IoError(_) => true,
            PlaylistError::Serialization(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_player_error_from_audio_error() {
        let audio_error = AudioError::DeviceNotFound {
            device: "Test Device".to_string(),
        };
        let player_error: PlayerError = audio_error.into();

        match player_error {
            PlayerError::Audio(AudioError::DeviceNotFound { device }) => {
                assert_eq!(device, "Test Device");
            }
            _ => panic!("Expected Audio error variant"),
        }
    }

    #[test]
    fn test_player_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let player_error: PlayerError = io_error.into();

        assert!(matches!(player_error, PlayerError::File(_)));
        assert_eq!(player_error.user_message(), "File or directory not found");
    }

    #[test]
    fn test_empty_source_message() {
        let err = AudioError::EmptySource { path: String::new() };
        assert_eq!(err.user_message(), "No audio file was given");

        let err = AudioError::EmptySource { path: "a.ogg".to_string() };
        assert!(err.user_message().contains("a.ogg"));
    }

    #[test]
    fn test_severity_levels() {
        let err: PlayerError = AssetError::NotCached { path: "x.png".to_string() }.into();
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.is_recoverable());

        let err: PlayerError = PlaylistError::PlaylistNotFound { id: "p".to_string() }.into();
        assert_eq!(err.severity().log_level(), log::Level::Info);

        let err: PlayerError = AudioError::StreamError("gone".to_string()).into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_playlist_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PlaylistError = json_err.into();
        assert!(!err.is_recoverable());
        assert!(err.user_message().starts_with("Playlist record is malformed"));
    }
}
