//! Commands served by the backend's REST endpoints.

use std::time::Duration;

use serde_json::json;
use statelink_core::api::{AppConfig, CliError, StateMachine};

use crate::commands::cli::{ErrorsArgs, StatusArgs};
use crate::http::client::RemoteClient;

pub fn remote_client(cfg: &AppConfig) -> Result<RemoteClient, CliError> {
    RemoteClient::new(&cfg.api.base_url, Duration::from_secs(cfg.api.timeout_secs))
}

/// Handle `statelink status`
pub async fn handle_status(args: StatusArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let state = remote_client(cfg)?.get_state().await?;
    let available = StateMachine::available_transitions(state);

    if args.json {
        let output = json!({ "state": state, "available": available });
        println!("{output}");
    } else {
        let names: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
        println!("state: {state}");
        println!("next:  {}", names.join(", "));
    }
    Ok(())
}

/// Handle `statelink errors`
pub async fn handle_errors(args: ErrorsArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let errors = remote_client(cfg)?.get_errors().await?;

    if args.json {
        let output = serde_json::to_string_pretty(&json!({ "errors": errors }))
            .map_err(|e| CliError::Command(format!("encode errors: {e}")))?;
        println!("{output}");
    } else if errors.is_empty() {
        println!("No errors recorded");
    } else {
        for entry in errors {
            println!("{}  {}", entry.timestamp, entry.message);
        }
    }
    Ok(())
}
