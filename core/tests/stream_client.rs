mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{init_tracing, next_accepted, HangingConnector, MemoryConnector};
use pretty_assertions::assert_eq;
use statelink_core::state::State;
use statelink_core::stream::{ConnectionState, ReconnectPolicy, StreamClient};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::Fixed {
        delay: Duration::from_millis(20),
    }
}

async fn wait_for_state(client: &StreamClient, want: ConnectionState) {
    let mut rx = client.subscribe_connection();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("never reached {want}"))
        .unwrap();
}

fn recording(client: &StreamClient) -> Arc<Mutex<Vec<State>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.on_inbound_update(move |state| sink.lock().unwrap().push(state));
    seen
}

#[tokio::test]
async fn delivers_updates_in_order_and_skips_malformed() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    let client = StreamClient::new(connector, fast_policy());
    let seen = recording(&client);
    client.connect();

    let remote = next_accepted(&mut accepted, WAIT).await;
    remote.push_state("STANDBY");
    remote.push(r#"{"type":"state_update","state":"WARP"}"#);
    remote.push(r#"{"type":"telemetry","value":3}"#);
    remote.push("{not json");
    remote.push_state("CALIBRATE");
    remote.push_state("OFF");

    tokio::time::sleep(QUIET).await;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![State::Standby, State::Calibrate, State::Off]
    );
    assert_eq!(client.connection_state(), ConnectionState::Open);

    client.close();
    client.join().await;
}

#[tokio::test]
async fn every_handler_sees_every_update() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    let client = StreamClient::new(connector, fast_policy());
    let first = recording(&client);
    let second = recording(&client);
    client.connect();

    let remote = next_accepted(&mut accepted, WAIT).await;
    remote.push_state("ACTIVE");
    tokio::time::sleep(QUIET).await;

    assert_eq!(*first.lock().unwrap(), vec![State::Active]);
    assert_eq!(*second.lock().unwrap(), vec![State::Active]);
    client.close();
}

#[tokio::test]
async fn send_while_open_writes_one_frame() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    let client = StreamClient::new(connector, fast_policy());
    client.connect();

    let mut remote = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;

    client.send(State::Standby);
    assert_eq!(
        remote.next_frame(WAIT).await.as_deref(),
        Some(r#"{"type":"state_change","state":"STANDBY"}"#)
    );
    assert_eq!(remote.next_frame(QUIET).await, None);
    client.close();
}

#[tokio::test]
async fn send_while_disconnected_is_dropped_not_replayed() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    connector.set_refuse(true);
    let client = StreamClient::new(connector.clone(), fast_policy());
    client.connect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(client.connection_state(), ConnectionState::Open);
    client.send(State::Standby);

    connector.set_refuse(false);
    let mut remote = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;

    assert_eq!(remote.next_frame(QUIET).await, None);
    client.close();
}

#[tokio::test]
async fn never_gives_up_on_unreachable_backend() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    connector.set_refuse(true);
    let client = StreamClient::new(connector.clone(), fast_policy());
    client.connect();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(connector.attempts() >= 5, "attempts = {}", connector.attempts());
    assert!(matches!(
        client.connection_state(),
        ConnectionState::Reconnecting | ConnectionState::Connecting
    ));
    assert!(!client.is_closed());

    connector.set_refuse(false);
    let _remote = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;
    client.close();
}

#[tokio::test]
async fn reconnects_after_remote_hang_up() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    let client = StreamClient::new(connector.clone(), fast_policy());
    let seen = recording(&client);
    let mut transitions = client.subscribe_connection();
    client.connect();

    let mut first = next_accepted(&mut accepted, WAIT).await;
    first.push_state("STANDBY");
    wait_for_state(&client, ConnectionState::Open).await;

    first.hang_up();
    tokio::time::timeout(
        WAIT,
        transitions.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await
    .unwrap()
    .unwrap();

    let second = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;
    second.push_state("CALIBRATE");
    tokio::time::sleep(QUIET).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![State::Standby, State::Calibrate]
    );
    assert_eq!(connector.attempts(), 2);
    client.close();
}

#[tokio::test]
async fn close_stops_reconnect_loop() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    let client = StreamClient::new(connector.clone(), fast_policy());
    client.connect();
    let _remote = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;

    client.close();
    client.join().await;
    assert_eq!(client.connection_state(), ConnectionState::Closed);

    let attempts = connector.attempts();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.attempts(), attempts);

    client.send(State::Standby);
    client.close();
    client.connect();
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn close_from_another_thread() {
    init_tracing();
    let (connector, _accepted) = MemoryConnector::new();
    connector.set_refuse(true);
    let client = Arc::new(StreamClient::new(connector, fast_policy()));
    client.connect();

    let remote_handle = client.clone();
    std::thread::spawn(move || remote_handle.close())
        .join()
        .unwrap();

    client.join().await;
    assert!(client.is_closed());
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn stalled_handshake_counts_as_failed_attempt() {
    init_tracing();
    let connector = Arc::new(HangingConnector::default());
    let client = StreamClient::with_connect_timeout(
        connector.clone(),
        fast_policy(),
        Duration::from_millis(50),
    );
    client.connect();

    wait_for_state(&client, ConnectionState::Reconnecting).await;
    let deadline = tokio::time::Instant::now() + WAIT;
    while connector.attempts() < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stuck after {} attempt(s) in {}",
            connector.attempts(),
            client.connection_state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Close must also interrupt an attempt that is still hanging.
    client.close();
    tokio::time::timeout(WAIT, client.join()).await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn exponential_backoff_resets_after_successful_open() {
    init_tracing();
    let (connector, mut accepted) = MemoryConnector::new();
    connector.set_refuse(true);
    let client = StreamClient::new(
        connector.clone(),
        ReconnectPolicy::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_secs(5),
        },
    );
    client.connect();

    let deadline = tokio::time::Instant::now() + WAIT;
    while connector.attempts() < 4 {
        assert!(tokio::time::Instant::now() < deadline, "too few attempts");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    connector.set_refuse(false);

    // Delays while refused: 50ms, 100ms, 200ms.
    let times = connector.attempt_times();
    assert!(times[1] - times[0] >= Duration::from_millis(50));
    assert!(times[3] - times[2] >= Duration::from_millis(200));

    let mut remote = next_accepted(&mut accepted, WAIT).await;
    wait_for_state(&client, ConnectionState::Open).await;

    // Four failures in, an unreset delay would now be 800ms.
    let lost = std::time::Instant::now();
    remote.hang_up();
    let _fresh = next_accepted(&mut accepted, WAIT).await;
    let gap = lost.elapsed();
    assert!(gap >= Duration::from_millis(50), "reconnected after {gap:?}");
    assert!(gap < Duration::from_millis(400), "reconnected after {gap:?}");

    client.close();
    client.join().await;
}
