use clap::{Args as ClapArgs, Parser, Subcommand};
use statelink_core::api::State;

#[derive(Parser, Debug)]
#[command(name = "statelink", version, about = "Operator control surface for a five-state device")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// WebSocket endpoint of the backend (overrides `[stream].url`).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// REST base URL of the backend (overrides `[api].base_url`).
    #[arg(long, global = true)]
    pub api_url: Option<String>,
}

/// Accepts state names case-insensitively on the command line.
pub fn parse_state(raw: &str) -> Result<State, String> {
    raw.trim()
        .to_ascii_uppercase()
        .parse::<State>()
        .map_err(|e| format!("{e} (expected one of OFF, STANDBY, CALIBRATE, READY, ACTIVE)"))
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WatchArgs {
    /// Print one JSON object per event instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SetArgs {
    #[arg(value_parser = parse_state)]
    pub state: State,

    /// How long to wait for the connection and for the backend's confirmation.
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// Send through `POST /api/state` instead of the stream.
    #[arg(long)]
    pub rest: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ErrorsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Promote CALIBRATE to READY after this many milliseconds.
    #[arg(long)]
    pub calibrate_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow state and connection changes.
    Watch(WatchArgs),
    /// Request a transition and wait for the backend to confirm it.
    Set(SetArgs),
    /// Show the backend's current state.
    Status(StatusArgs),
    /// Show the backend's recent rejected requests.
    Errors(ErrorsArgs),
    /// Run the reference backend.
    Serve(ServeArgs),
}
