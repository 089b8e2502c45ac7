//! Command-line interface for voxserve
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// OpenAI-compatible speech server
#[derive(Parser, Debug)]
#[command(
    name = "voxserve",
    version,
    about = "OpenAI-compatible speech-to-text and text-to-speech server",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Overrides for the `serve` command; unset flags keep the config value.
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct ServeArgs {
    /// Address to bind (default: 0.0.0.0)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on (default: 8000)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,

    /// Whisper model loaded at startup (e.g., base.en, small, large-v3-turbo)
    #[arg(long, value_name = "MODEL")]
    pub stt_model: Option<String>,

    /// Speech synthesis model loaded at startup (e.g., espeak-ng)
    #[arg(long, value_name = "MODEL")]
    pub tts_model: Option<String>,

    /// Synthesis language code (a: US English, b: British English, f: French, ...)
    #[arg(long, value_name = "CODE")]
    pub tts_lang: Option<String>,

    /// Upper bound on one model load. Examples: 90s, 10m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub load_timeout: Option<Duration>,
}

/// Parse a duration; bare numbers are seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Manage Whisper models
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Model management actions
#[derive(Subcommand, Debug, PartialEq)]
pub enum ModelsAction {
    /// List available and installed models
    List,
    /// Download and install a model
    Install {
        /// Model name (e.g., base.en, small.en, tiny)
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["voxserve"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.serve, ServeArgs::default());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["voxserve", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_top_level_serve_flags() {
        let cli = Cli::try_parse_from([
            "voxserve",
            "--port",
            "9000",
            "--stt-model",
            "small.en",
            "--tts-lang",
            "b",
            "--load-timeout",
            "2m",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.serve.port, Some(9000));
        assert_eq!(cli.serve.stt_model.as_deref(), Some("small.en"));
        assert_eq!(cli.serve.tts_lang.as_deref(), Some("b"));
        assert_eq!(cli.serve.load_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_serve_subcommand() {
        let cli = Cli::try_parse_from(["voxserve", "serve", "--host", "127.0.0.1", "-p", "8080"])
            .unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
                assert_eq!(args.port, Some(8080));
            }
            other => panic!("Expected Serve command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_models_install() {
        let cli = Cli::try_parse_from(["voxserve", "models", "install", "tiny.en"]).unwrap();
        match cli.command {
            Some(Commands::Models { action }) => assert_eq!(
                action,
                ModelsAction::Install {
                    name: "tiny.en".to_string()
                }
            ),
            other => panic!("Expected Models command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["voxserve", "config", "show", "--config", "/tmp/v.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/v.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["voxserve", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}
