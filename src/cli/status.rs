use std::fmt::Write as _;
use std::time::Duration;

use crate::audio::DeviceSummary;
use crate::error::{ErrorSeverity, PlayerError};
use crate::models::{PlayPosition, Playlist};
use crate::playlist::PlaybackState;
use crate::runner::RunnerStatus;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Full player status: current slide, music and event counters
    pub fn format_status(status: &RunnerStatus) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "┌─ Player Status ─────────────────────────────────────────┐");
        let _ = writeln!(out, "│ State: {}", Self::state_name(status.state));

        match &status.slide {
            Some(slide) => {
                let _ = writeln!(out, "│ Playlist: {}", Self::truncate(&slide.playlist_id, 47));
                let _ = writeln!(
                    out,
                    "│ Slide: {} (#{}){}",
                    Self::truncate(&slide.slide_id, 36),
                    slide.slide_index + 1,
                    if status.slide_error { " [error]" } else { "" }
                );
                let _ = writeln!(
                    out,
                    "│ Shown for: {}",
                    Self::format_duration(Duration::from_secs_f64(slide.elapsed.max(0.0)))
                );
            }
            None => {
                let _ = writeln!(out, "│ No slide shown");
            }
        }
        let _ = writeln!(out, "│ Loops: {} | Held frames: {}", status.loops, status.held_frames);

        if let Some(music) = &status.music {
            let _ = writeln!(out, "│");
            match &music.path {
                Some(path) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    let _ = writeln!(out, "│ Music: {}", Self::truncate(&name, 50));
                    let _ = writeln!(
                        out,
                        "│ {} at {}{}",
                        if music.playing { "Playing" } else { "Paused" },
                        Self::format_duration(Duration::from_secs_f32(music.position.max(0.0))),
                        music.info.map(|info| format!(" ({})", info.describe())).unwrap_or_default()
                    );
                }
                None => {
                    let _ = writeln!(out, "│ Music: none loaded");
                }
            }
            let _ = writeln!(
                out,
                "│ Volume: {}%{}",
                (music.volume * 100.0).round() as u8,
                if status.muted { " (muted by slide)" } else { "" }
            );
        }

        let events = &status.events;
        let _ = writeln!(out, "│");
        let _ = writeln!(
            out,
            "│ Assets: {} fetched, {} failed",
            events.assets_fetched, events.asset_failures
        );
        if events.render_underruns > 0 {
            let _ = writeln!(out, "│ Audio underruns: {}", events.render_underruns);
        }
        let _ = write!(out, "└─────────────────────────────────────────────────────────┘");
        out
    }

    /// Stored playlists with the saved position marked
    pub fn format_playlists(playlists: &[Playlist], position: Option<&PlayPosition>) -> String {
        if playlists.is_empty() {
            return "No playlists stored".to_string();
        }
        let mut out = format!("Stored playlists ({}):", playlists.len());
        for playlist in playlists {
            let current = position.is_some_and(|p| p.playlist_id == playlist.id);
            let total: f64 = playlist.items.iter().map(|item| item.duration).sum();
            let _ = write!(
                out,
                "\n{} {} - {} slides, {}{}, updated {}",
                if current { ">" } else { " " },
                playlist.id,
                playlist.len(),
                Self::format_duration(Duration::from_secs_f64(total.max(0.0))),
                if playlist.looping { ", looping" } else { "" },
                playlist.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(position) = position.filter(|_| current) {
                if let Some(item) = playlist.items.get(position.slide_index) {
                    let _ = write!(out, "\n    resumes at '{}'", item.id);
                }
            }
        }
        out
    }

    pub fn format_devices(devices: &[DeviceSummary]) -> String {
        if devices.is_empty() {
            return "No audio devices found".to_string();
        }
        let mut out = String::from("Available audio devices:");
        for device in devices {
            let _ = write!(
                out,
                "\n{} {} ({} ch, {})",
                if device.is_default { "*" } else { " " },
                device.name,
                device.max_channels,
                device
                    .sample_format
                    .map(|format| format.to_string())
                    .unwrap_or_else(|| "unknown format".to_string())
            );
        }
        out
    }

    /// Display error message with formatting
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!(
            "┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon,
            severity.as_str()
        );
        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }
        if let Some(hint) = Self::error_hint(error) {
            eprintln!("│");
            eprintln!("│ {}", hint);
        }
        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());
    }

    fn error_hint(error: &PlayerError) -> Option<&'static str> {
        use crate::error::{AudioError, PlaylistError};
        match error {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => Some("Use 'signage devices' to see available devices"),
            PlayerError::Audio(AudioError::EngineStopped) => Some("Start with --music <FILE> to enable music"),
            PlayerError::Playlist(PlaylistError::PlaylistNotFound { .. }) => Some("Use 'signage playlists' to list playlists"),
            PlayerError::Config(_) => Some("Configuration will use default values"),
            _ => None,
        }
    }

    fn state_name(state: PlaybackState) -> &'static str {
        match state {
            PlaybackState::Idle => "Idle",
            PlaybackState::Preparing => "Preparing",
            PlaybackState::Playing => "Playing",
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    /// Format duration as MM:SS or HH:MM:SS
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }
}
