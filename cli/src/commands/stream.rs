//! Commands that talk to the backend over the state stream.

use std::time::Duration;

use serde_json::json;
use statelink_core::api::{AppConfig, CliError, ConnectionState, Session, State, StateSnapshot};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::commands::backend::remote_client;
use crate::commands::cli::{SetArgs, WatchArgs};

/// Handle `statelink watch`: print every connection change and every
/// authoritative state update until Ctrl+C.
pub async fn handle_watch(args: WatchArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let session = Session::from_config(&cfg.stream);
    let mut updates = session.subscribe();
    let mut connection = session.subscribe_connection();
    session.start();
    info!(target: "statelink.cli", "watching {}", session.client().endpoint());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                print_connection(args.json, state);
            }
            update = updates.recv() => match update {
                Ok(snapshot) => print_state(args.json, &session, &snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "statelink.cli", skipped, "watch fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

fn print_connection(as_json: bool, state: ConnectionState) {
    if as_json {
        println!("{}", json!({ "event": "connection", "connection": state.to_string() }));
    } else {
        println!("[connection] {state}");
    }
}

fn print_state(as_json: bool, session: &Session, snapshot: &StateSnapshot) {
    let available = session.controller().available_transitions();
    if as_json {
        println!(
            "{}",
            json!({
                "event": "state",
                "state": snapshot.state,
                "changed_at": snapshot.changed_at.to_rfc3339(),
                "available": available,
            })
        );
    } else {
        let names: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
        println!("[state] {} (next: {})", snapshot.state, names.join(", "));
    }
}

/// Handle `statelink set <STATE>`.
pub async fn handle_set(args: SetArgs, cfg: &AppConfig) -> Result<(), CliError> {
    if args.rest {
        let committed = remote_client(cfg)?.set_state(args.state).await?;
        println!("{committed}");
        return Ok(());
    }

    let session = Session::from_config(&cfg.stream);
    let result =
        request_and_confirm(&session, args.state, Duration::from_millis(args.timeout_ms)).await;
    session.close().await;

    let from = result?;
    println!("{from} -> {}", args.state);
    Ok(())
}

/// Starts `session`, waits for the backend's initial state, requests `to` and
/// waits until the backend broadcasts it. Returns the state the request was
/// made from.
///
/// Each wait is bounded by `timeout`. A request the local state machine
/// rejects is returned as [`CliError::Transition`] and never sent.
pub async fn request_and_confirm(
    session: &Session,
    to: State,
    timeout: Duration,
) -> Result<State, CliError> {
    let mut updates = session.subscribe();
    session.start();

    if !session.wait_open(timeout).await {
        return Err(CliError::Command(format!(
            "backend at {} not reachable within {}ms",
            session.client().endpoint(),
            timeout.as_millis()
        )));
    }

    let from = match tokio::time::timeout(timeout, updates.recv()).await {
        Ok(Ok(snapshot)) => snapshot.state,
        Ok(Err(e)) => return Err(CliError::Command(format!("state stream ended: {e}"))),
        Err(_) => {
            return Err(CliError::Command(
                "backend sent no initial state".to_string(),
            ))
        }
    };

    session.request_transition(to)?;
    debug!(target: "statelink.cli", "requested {from} -> {to}");

    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, updates.recv()).await {
            Ok(Ok(snapshot)) if snapshot.state == to => return Ok(from),
            Ok(Ok(snapshot)) => {
                debug!(target: "statelink.cli", "ignoring update {}", snapshot.state);
            }
            Ok(Err(RecvError::Lagged(_))) => {
                if session.current() == to {
                    return Ok(from);
                }
            }
            Ok(Err(RecvError::Closed)) => {
                return Err(CliError::Command("state stream ended".to_string()))
            }
            Err(_) => {
                return Err(CliError::Command(format!(
                    "backend did not confirm {to} within {}ms (current: {})",
                    timeout.as_millis(),
                    session.current()
                )))
            }
        }
    }
}
