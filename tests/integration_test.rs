use axum::body::Body;
use axum::http::{Request, StatusCode};
use planning_poker::api;
use planning_poker::broadcast::Envelope;
use planning_poker::state::AppState;
use planning_poker::types::{new_connection_id, ConnectionId};
use planning_poker::ws::handlers::handle_message;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tower::ServiceExt;

/// A simulated connection: its id plus its view of the broadcast channel
struct Client {
    id: ConnectionId,
    rx: Receiver<Envelope>,
}

impl Client {
    fn connect(state: &Arc<AppState>) -> Self {
        Self {
            id: new_connection_id(),
            rx: state.broadcast.subscribe(),
        }
    }

    /// Send a frame and return everything this client has received since the
    /// last drain, its own reply included
    async fn send(&mut self, state: &Arc<AppState>, text: &str) -> Vec<Value> {
        handle_message(text, &self.id, state).await;
        self.drain()
    }

    /// Everything delivered to this client since the last drain
    fn drain(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.is_for(&self.id) {
                out.push(serde_json::to_value(&envelope.message).unwrap());
            }
        }
        out
    }
}

fn roster_entry(name: &str, choice: Value, snoozed: bool) -> Value {
    json!({"name": name, "choice": choice, "snoozed": snoozed, "observer": false})
}

#[tokio::test]
async fn test_unregistered_client_gets_error() {
    let state = Arc::new(AppState::default());
    let mut client = Client::connect(&state);
    let mut bystander = Client::connect(&state);

    let received = client.send(&state, r#"{"action": "test"}"#).await;
    assert_eq!(received, vec![json!({"error": "not registered"})]);

    let received = client.send(&state, r#"{"action": "reset"}"#).await;
    assert_eq!(received, vec![json!({"error": "not registered"})]);

    assert!(bystander.drain().is_empty());
}

#[tokio::test]
async fn test_malformed_payloads() {
    let state = Arc::new(AppState::default());
    let mut client = Client::connect(&state);
    let malformed = json!({"error": "malformed request, missing action"});

    for raw in ["{", "hello", r#"{"name": "aaa"}"#, "null"] {
        let received = client.send(&state, raw).await;
        assert_eq!(received, vec![malformed.clone()], "input: {raw}");
    }

    // Once registered, an unknown action is malformed rather than unregistered
    client
        .send(&state, r#"{"action": "register", "name": "aaa"}"#)
        .await;
    let received = client.send(&state, r#"{"action": "dance"}"#).await;
    assert_eq!(received, vec![malformed.clone()]);
    let received = client
        .send(&state, r#"{"action": "record-choice", "choice": 5}"#)
        .await;
    assert_eq!(received, vec![malformed]);
}

#[tokio::test]
async fn test_registration_flow() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);

    let received = ws1
        .send(&state, r#"{"action": "register", "name": "a"}"#)
        .await;
    assert_eq!(
        received,
        vec![json!({"action": "register", "error": "name is too short"})]
    );

    let received = ws1
        .send(&state, r#"{"action": "register", "name": "aa"}"#)
        .await;
    assert_eq!(
        received,
        vec![json!({"action": "register", "error": "name is too short"})]
    );
    assert!(ws2.drain().is_empty());

    let received = ws1
        .send(&state, r#"{"action": "register", "name": "bbb"}"#)
        .await;
    let expected_players = json!([roster_entry("bbb", Value::Null, false)]);
    assert_eq!(
        received,
        vec![json!({"action": "register", "players": expected_players, "reset": true})]
    );

    // ws2 sees the plain roster, ws1 only got its reply
    assert_eq!(
        ws2.drain(),
        vec![json!({"players": expected_players, "reset": true})]
    );

    let received = ws2
        .send(&state, r#"{"action": "register", "name": "bbb"}"#)
        .await;
    assert_eq!(
        received,
        vec![json!({"action": "register", "error": "name is already taken"})]
    );
    assert!(ws1.drain().is_empty());
    assert_eq!(state.players().await.len(), 1);
}

#[tokio::test]
async fn test_register_reply_follows_earlier_broadcasts() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);

    ws2.send(&state, r#"{"action": "register", "name": "bbb"}"#)
        .await;

    // ws1 has not read bbb's choice yet when it registers
    ws1.drain();
    handle_message(
        r#"{"action": "record-choice", "choice": "3"}"#,
        &ws2.id,
        &state,
    )
    .await;
    let received = ws1
        .send(&state, r#"{"action": "register", "name": "aaa"}"#)
        .await;

    // The registration cleared bbb's choice, so the roster must come last
    assert_eq!(
        received,
        vec![
            json!({"name": "bbb", "selected": true}),
            json!({
                "action": "register",
                "players": [
                    roster_entry("bbb", Value::Null, false),
                    roster_entry("aaa", Value::Null, false)
                ],
                "reset": true
            }),
        ]
    );
}

#[tokio::test]
async fn test_reset_forwarded_to_all() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);

    ws1.send(&state, r#"{"action": "register", "name": "aaa"}"#)
        .await;
    ws2.drain();

    let expected = json!({"reset": true, "originator": "aaa"});
    assert_eq!(
        ws1.send(&state, r#"{"action": "reset"}"#).await,
        vec![expected.clone()]
    );
    assert_eq!(ws2.drain(), vec![expected]);
}

#[tokio::test]
async fn test_two_player_round() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);

    ws1.send(&state, r#"{"action": "register", "name": "player1"}"#)
        .await;
    ws2.send(&state, r#"{"action": "register", "name": "player2"}"#)
        .await;
    ws1.drain();

    let selected = json!({"name": "player1", "selected": true});
    assert_eq!(
        ws1.send(&state, r#"{"action": "record-choice", "choice": "2"}"#)
            .await,
        vec![selected.clone()]
    );
    assert_eq!(ws2.drain(), vec![selected]);

    let reveal = json!({
        "choices": [
            roster_entry("player1", json!("2"), false),
            roster_entry("player2", json!("1"), false)
        ],
        "unanimous": false
    });
    assert_eq!(
        ws2.send(&state, r#"{"action": "record-choice", "choice": "1"}"#)
            .await,
        vec![reveal.clone()]
    );
    assert_eq!(ws1.drain(), vec![reveal]);

    // Late changes after the reveal are dropped silently
    let received = ws1
        .send(&state, r#"{"action": "record-choice", "choice": "8"}"#)
        .await;
    assert!(received.is_empty());
    assert!(ws2.drain().is_empty());

    // Reset opens a new round
    ws2.send(&state, r#"{"action": "reset"}"#).await;
    ws1.drain();
    ws1.send(&state, r#"{"action": "record-choice", "choice": "8"}"#)
        .await;
    assert_eq!(
        ws2.drain(),
        vec![json!({"name": "player1", "selected": true})]
    );
}

#[tokio::test]
async fn test_single_player_does_not_reveal() {
    let state = Arc::new(AppState::default());
    let mut ws = Client::connect(&state);

    ws.send(&state, r#"{"action": "register", "name": "ccc"}"#)
        .await;
    let received = ws
        .send(&state, r#"{"action": "record-choice", "choice": "?"}"#)
        .await;

    assert_eq!(received, vec![json!({"name": "ccc", "selected": true})]);
}

#[tokio::test]
async fn test_snooze_flow() {
    let state = Arc::new(AppState::default());
    let mut ws = Client::connect(&state);

    ws.send(&state, r#"{"action": "register", "name": "ccc"}"#)
        .await;

    let received = ws
        .send(&state, r#"{"action": "snooze", "player": "aaa"}"#)
        .await;
    assert_eq!(
        received,
        vec![json!({"action": "snooze", "error": "Player not found"})]
    );

    let received = ws
        .send(&state, r#"{"action": "snooze", "player": "ccc"}"#)
        .await;
    assert_eq!(
        received,
        vec![json!({"action": "snooze", "player": "ccc", "snoozed": true})]
    );

    ws.send(&state, r#"{"action": "record-choice", "choice": "?"}"#)
        .await;
    assert!(!state.players().await[0].snoozed);
}

#[tokio::test]
async fn test_snooze_completes_round() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);
    let mut ws3 = Client::connect(&state);

    ws1.send(&state, r#"{"action": "register", "name": "player1"}"#)
        .await;
    ws2.send(&state, r#"{"action": "register", "name": "player2"}"#)
        .await;
    ws3.send(&state, r#"{"action": "register", "name": "player3"}"#)
        .await;
    ws1.send(&state, r#"{"action": "record-choice", "choice": "5"}"#)
        .await;
    ws2.send(&state, r#"{"action": "record-choice", "choice": "5"}"#)
        .await;
    ws1.drain();

    // player1 snoozes the straggler
    let received = ws1
        .send(&state, r#"{"action": "snooze", "player": "player3"}"#)
        .await;

    assert_eq!(
        received,
        vec![
            json!({"action": "snooze", "player": "player3", "snoozed": true}),
            json!({
                "choices": [
                    roster_entry("player1", json!("5"), false),
                    roster_entry("player2", json!("5"), false),
                    roster_entry("player3", Value::Null, true)
                ],
                "unanimous": true
            })
        ]
    );
}

#[tokio::test]
async fn test_observer_registration() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);
    let mut ws3 = Client::connect(&state);

    ws1.send(&state, r#"{"action": "register", "name": "player1"}"#)
        .await;
    ws2.send(&state, r#"{"action": "register", "name": "player2"}"#)
        .await;
    let received = ws3
        .send(
            &state,
            r#"{"action": "register", "name": "watcher", "observer": true}"#,
        )
        .await;
    let reply = received.last().unwrap();
    assert_eq!(reply["action"], json!("register"));
    assert_eq!(reply["players"][2]["observer"], json!(true));

    ws1.send(&state, r#"{"action": "record-choice", "choice": "3"}"#)
        .await;
    ws2.send(&state, r#"{"action": "record-choice", "choice": "5"}"#)
        .await;

    let messages = ws1.drain();
    let reveal = messages.last().unwrap();
    assert_eq!(reveal["choices"].as_array().unwrap().len(), 3);
    assert_eq!(reveal["unanimous"], json!(false));
}

#[tokio::test]
async fn test_disconnect_resets_round_for_remaining() {
    let state = Arc::new(AppState::default());
    let mut ws1 = Client::connect(&state);
    let mut ws2 = Client::connect(&state);

    ws1.send(&state, r#"{"action": "register", "name": "player1"}"#)
        .await;
    ws2.send(&state, r#"{"action": "register", "name": "player2"}"#)
        .await;
    ws1.send(&state, r#"{"action": "record-choice", "choice": "2"}"#)
        .await;
    ws1.drain();

    state.disconnect(&ws2.id).await;

    assert_eq!(
        ws1.drain(),
        vec![json!({
            "players": [roster_entry("player1", Value::Null, false)],
            "reset": true
        })]
    );

    // The name can be claimed by a new connection
    let mut ws3 = Client::connect(&state);
    let received = ws3
        .send(&state, r#"{"action": "register", "name": "player2"}"#)
        .await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["action"], json!("register"));
    assert!(received[0].get("error").is_none());
}

#[tokio::test]
async fn test_concurrent_registration_same_name() {
    let state = Arc::new(AppState::default());
    let mut rx = state.broadcast.subscribe();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let id = new_connection_id();
            handle_message(r#"{"action": "register", "name": "racer"}"#, &id, &state).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut successes = 0;
    let mut rejections = 0;
    while let Ok(envelope) = rx.try_recv() {
        // Only direct replies, not the roster for everyone else
        if envelope.only.is_none() {
            continue;
        }
        let reply = serde_json::to_value(&envelope.message).unwrap();
        if reply.get("error").is_none() {
            successes += 1;
        } else {
            rejections += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(rejections, 15);
    assert_eq!(state.players().await.len(), 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = Arc::new(AppState::default());
    let mut client = Client::connect(&state);
    client
        .send(&state, r#"{"action": "register", "name": "aaa"}"#)
        .await;

    let response = api::router(state)
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({"status": "ok", "players": 1, "connections": 1})
    );
}
