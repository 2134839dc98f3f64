use clap::Parser;
use statelink_cli::commands::{backend, cli, stream};
use statelink_cli::http;
use statelink_core::api::{AppConfig, CliError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<(), CliError> {
    let args = cli::Args::parse();
    let mut cfg =
        statelink_core::config::load_default().map_err(|e| CliError::Config(e.to_string()))?;
    apply_cli_overrides(&mut cfg, &args);
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    dispatch(args.command, &cfg).await
}

fn apply_cli_overrides(cfg: &mut AppConfig, args: &cli::Args) {
    if let Some(url) = &args.url {
        cfg.stream.url = url.clone();
    }
    if let Some(url) = &args.api_url {
        cfg.api.base_url = url.clone();
    }
}

async fn dispatch(cmd: cli::Commands, cfg: &AppConfig) -> Result<(), CliError> {
    match cmd {
        cli::Commands::Watch(args) => stream::handle_watch(args, cfg).await,
        cli::Commands::Set(args) => stream::handle_set(args, cfg).await,
        cli::Commands::Status(args) => backend::handle_status(args, cfg).await,
        cli::Commands::Errors(args) => backend::handle_errors(args, cfg).await,
        cli::Commands::Serve(args) => http::handle_serve(args, cfg).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("statelink"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("statelink.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
