use crate::cli::{CliApp, Commands, ConsoleCommand, ParseError};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_parse_slide_commands() {
    assert_eq!(CliApp::parse_command("next").unwrap(), ConsoleCommand::Next);
    assert_eq!(CliApp::parse_command("n").unwrap(), ConsoleCommand::Next);
    assert_eq!(CliApp::parse_command("previous").unwrap(), ConsoleCommand::Prev);
    assert_eq!(CliApp::parse_command("  home  ").unwrap(), ConsoleCommand::Home);
    assert_eq!(CliApp::parse_command("refresh").unwrap(), ConsoleCommand::Refresh);
    assert_eq!(CliApp::parse_command("status").unwrap(), ConsoleCommand::Status);

    match CliApp::parse_command("goto lobby intro").unwrap() {
        ConsoleCommand::Goto { playlist, slide } => {
            assert_eq!(playlist, "lobby");
            assert_eq!(slide, "intro");
        }
        other => panic!("Expected Goto command, got {:?}", other),
    }

    match CliApp::parse_command("goto lobby").unwrap_err() {
        ParseError::MissingArgument { command, argument } => {
            assert_eq!(command, "goto");
            assert_eq!(argument, "slide");
        }
        other => panic!("Expected MissingArgument error, got {:?}", other),
    }
}

#[test]
fn test_parse_music_commands() {
    assert_eq!(CliApp::parse_command("play").unwrap(), ConsoleCommand::Play);
    assert_eq!(CliApp::parse_command("pause").unwrap(), ConsoleCommand::Pause);
    assert_eq!(
        CliApp::parse_command("seek 1:30").unwrap(),
        ConsoleCommand::Seek {
            position: Duration::from_secs(90)
        }
    );
    assert!(matches!(
        CliApp::parse_command("seek soon").unwrap_err(),
        ParseError::InvalidTimeFormat { .. }
    ));
    assert!(matches!(
        CliApp::parse_command("seek").unwrap_err(),
        ParseError::MissingArgument { .. }
    ));
}

#[test]
fn test_parse_volume() {
    assert_eq!(CliApp::parse_command("volume 0").unwrap(), ConsoleCommand::Volume { level: 0 });
    assert_eq!(CliApp::parse_command("volume 100").unwrap(), ConsoleCommand::Volume { level: 100 });

    match CliApp::parse_command("volume 101").unwrap_err() {
        ParseError::InvalidArgument { argument, value, expected } => {
            assert_eq!(argument, "volume level");
            assert_eq!(value, "101");
            assert_eq!(expected, "0-100");
        }
        other => panic!("Expected InvalidArgument error, got {:?}", other),
    }

    match CliApp::parse_command("volume loud").unwrap_err() {
        ParseError::InvalidArgument { expected, .. } => assert_eq!(expected, "number 0-100"),
        other => panic!("Expected InvalidArgument error, got {:?}", other),
    }
}

#[test]
fn test_parse_command_errors() {
    assert!(matches!(CliApp::parse_command("").unwrap_err(), ParseError::EmptyCommand));
    assert!(matches!(CliApp::parse_command("   ").unwrap_err(), ParseError::EmptyCommand));
    assert!(matches!(CliApp::parse_command("help").unwrap_err(), ParseError::HelpRequested));

    match CliApp::parse_command("dance").unwrap_err() {
        ParseError::UnknownCommand { command } => assert_eq!(command, "dance"),
        other => panic!("Expected UnknownCommand error, got {:?}", other),
    }
}

#[test]
fn test_parse_time() {
    assert_eq!(CliApp::parse_time("1:30").unwrap(), Duration::from_secs(90));
    assert_eq!(CliApp::parse_time("0:05").unwrap(), Duration::from_secs(5));
    assert_eq!(CliApp::parse_time("90").unwrap(), Duration::from_secs(90));
    assert_eq!(CliApp::parse_time("90s").unwrap(), Duration::from_secs(90));
    assert_eq!(CliApp::parse_time("90.5").unwrap(), Duration::from_millis(90500));
    assert_eq!(CliApp::parse_time("1:30.25").unwrap(), Duration::from_millis(90250));
    assert_eq!(CliApp::parse_time("0").unwrap(), Duration::ZERO);

    for invalid in ["1:60", "1:2:3", "abc", "1:abc", "-30", "1:-30", "", "   ", "inf"] {
        assert!(CliApp::parse_time(invalid).is_err(), "{:?} should not parse", invalid);
    }
}

#[test]
fn test_format_duration() {
    assert_eq!(CliApp::format_duration(Duration::from_secs(0)), "00:00");
    assert_eq!(CliApp::format_duration(Duration::from_secs(90)), "01:30");
    assert_eq!(CliApp::format_duration(Duration::from_secs(3661)), "61:01");
}

#[test]
fn test_expand_path() {
    assert!(!CliApp::expand_path("~/signage").to_string_lossy().starts_with('~'));
    assert_eq!(CliApp::expand_path("/srv/signage"), PathBuf::from("/srv/signage"));
    assert_eq!(CliApp::expand_path("relative/dir"), PathBuf::from("relative/dir"));
}

#[test]
fn test_command_line_run() {
    let cli = CliApp::try_parse_from([
        "signage",
        "--config",
        "/etc/signage.toml",
        "run",
        "--playlist",
        "a.json",
        "--playlist",
        "b.json",
        "--music",
        "bg.ogg",
        "--fps",
        "60",
    ])
    .unwrap();

    assert_eq!(cli.config, Some(PathBuf::from("/etc/signage.toml")));
    match cli.command {
        Commands::Run {
            playlists,
            music,
            fps,
            no_audio,
            streaming,
        } => {
            assert_eq!(playlists, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
            assert_eq!(music, Some(PathBuf::from("bg.ogg")));
            assert_eq!(fps, 60);
            assert!(!no_audio);
            assert!(!streaming);
        }
        other => panic!("Expected Run command, got {:?}", other),
    }
}

#[test]
fn test_command_line_subcommands() {
    assert!(matches!(
        CliApp::try_parse_from(["signage", "import", "lobby.json"]).unwrap().command,
        Commands::Import { .. }
    ));
    assert!(matches!(
        CliApp::try_parse_from(["signage", "playlists"]).unwrap().command,
        Commands::Playlists
    ));
    assert!(matches!(
        CliApp::try_parse_from(["signage", "devices"]).unwrap().command,
        Commands::Devices
    ));
    assert!(CliApp::try_parse_from(["signage"]).is_err());
}

#[test]
fn test_parse_error_display() {
    let error = ParseError::MissingArgument {
        command: "goto".to_string(),
        argument: "slide".to_string(),
    };
    assert_eq!(error.to_string(), "Missing argument for goto: slide");
}
