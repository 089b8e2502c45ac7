use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use voxserve::cli::{Cli, Commands, ConfigAction, ModelsAction, ServeArgs};
use voxserve::config::Config;
use voxserve::engine::LocalEngineFactory;
use voxserve::models::catalog::list_models;
use voxserve::models::download::{ensure_model, format_model_info, list_installed_models};
use voxserve::models::remote::fetch_remote_models;
use voxserve::server::{self, AppState};
use voxserve::slots::{ModelKind, ModelSpec, SlotManager};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            init_tracing(cli.quiet, cli.verbose);
            run_server(cli.config.as_deref(), cli.serve).await?;
        }
        Some(Commands::Serve(args)) => {
            init_tracing(cli.quiet, cli.verbose);
            run_server(cli.config.as_deref(), args).await?;
        }
        Some(Commands::Models { action }) => {
            init_tracing(true, cli.verbose);
            handle_models_command(action).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "voxserve", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v`/`-vv` raise and `-q` lowers the default.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (_, 2..) => "voxserve=trace,tower_http=debug",
        (_, 1) => "voxserve=debug,tower_http=debug",
        (true, 0) => "voxserve=warn,tower_http=warn",
        (false, 0) => "voxserve=info,tower_http=info",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();
}

/// Read `--config` if given, otherwise the XDG config file when it exists,
/// then apply the `STT_*`, `TTS_*` and `VOXSERVE_*` environment overrides.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// Command-line flags override file and environment values.
fn apply_serve_args(mut config: Config, args: ServeArgs) -> Config {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.stt_model {
        config.stt.model = model;
    }
    if let Some(model) = args.tts_model {
        config.tts.model = model;
    }
    if let Some(lang) = args.tts_lang {
        config.tts.lang_code = lang;
    }
    if let Some(timeout) = args.load_timeout {
        config.limits.model_load_timeout_secs = timeout.as_secs();
    }
    config
}

async fn run_server(custom_path: Option<&std::path::Path>, args: ServeArgs) -> Result<()> {
    let config = apply_serve_args(load_config(custom_path)?, args);
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    tracing::info!("Starting voxserve {}", voxserve::version_string());

    let factory = LocalEngineFactory::new(config.stt.clone());
    let slots = Arc::new(SlotManager::new(
        Arc::new(factory),
        config.limits.model_load_timeout(),
    ));
    preload_models(&slots, &config);

    server::serve(AppState::new(slots, config)).await
}

/// Start the configured loads in the background. Failures leave the slot
/// empty and show up as degraded health; the server starts regardless.
fn preload_models(slots: &SlotManager, config: &Config) {
    let loads = [
        (
            ModelKind::Stt,
            config.stt.load_on_startup,
            ModelSpec::new(&config.stt.model, &config.stt.compute_type),
        ),
        (
            ModelKind::Tts,
            config.tts.load_on_startup,
            ModelSpec::new(&config.tts.model, &config.tts.lang_code),
        ),
    ];

    for (kind, enabled, spec) in loads {
        if !enabled {
            tracing::info!(%kind, "Startup load disabled; slot stays empty until a download request");
            continue;
        }
        match slots.begin_swap(kind, spec.clone()) {
            Ok(ticket) => {
                tokio::spawn(async move {
                    match ticket.wait().await {
                        Ok(outcome) => tracing::info!(
                            %kind,
                            model = %outcome.model_id,
                            version = outcome.version,
                            "Startup model ready"
                        ),
                        Err(e) => tracing::error!(%kind, model = %spec, "Startup load failed: {}", e),
                    }
                });
            }
            Err(e) => tracing::error!(%kind, model = %spec, "Could not start model load: {}", e),
        }
    }
}

/// Handle model management commands.
async fn handle_models_command(action: ModelsAction) -> Result<()> {
    match action {
        ModelsAction::List => {
            println!("Available models:");
            for model in list_models() {
                println!("  {}", format_model_info(model));
            }

            let catalog_names: HashSet<&str> = list_models().iter().map(|m| m.name).collect();
            let extra_installed: Vec<String> = list_installed_models()
                .into_iter()
                .filter(|name| !catalog_names.contains(name.as_str()))
                .collect();
            if !extra_installed.is_empty() {
                println!();
                println!("Other installed models:");
                for name in extra_installed {
                    println!("  {:16} {}", name, "[installed]".green());
                }
            }

            match fetch_remote_models().await {
                Ok(remote) => {
                    let extras: Vec<_> = remote
                        .iter()
                        .filter(|m| !catalog_names.contains(m.name.as_str()))
                        .collect();
                    if !extras.is_empty() {
                        println!();
                        println!("Remote models (from Hugging Face):");
                        for m in extras {
                            println!("  {:16} {:5} MB", m.name, m.size_mb);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("  {}", format!("(Could not fetch remote models: {e})").dimmed());
                }
            }
        }
        ModelsAction::Install { name } => {
            let resolved = voxserve::models::catalog::resolve_name(&name);
            if resolved != name {
                println!("Resolved '{name}' to '{resolved}'");
            }
            let path = ensure_model(&resolved).await?;
            println!("{} Model '{}' installed", "✓".green(), resolved);
            println!("Location: {}", path.display());
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
            for warning in config.validate() {
                eprintln!("{} {}", "warning:".yellow(), warning);
            }
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
