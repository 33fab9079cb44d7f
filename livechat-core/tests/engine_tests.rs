// ABOUTME: End-to-end tests for the LiveChat engine against scripted collaborators.
// ABOUTME: Runs on paused tokio time so poll intervals elapse instantly and exactly.

use livechat_core::testing::{ListStep, MockAuthProvider, MockTransport};
use livechat_core::{
    ApiError, AuthError, ChatAuthor, ChatEvent, ChatMessage, ConnectionState, Credentials,
    EngineConfig, ListPage, LiveChat, LiveChatError, MessageKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tokio::time::{timeout, Instant};

fn text(id: &str, body: &str) -> ChatMessage {
    ChatMessage::text(id, "chat-1", ChatAuthor::new("UCviewer", "viewer"), body)
}

fn deleted(id: &str) -> ChatMessage {
    ChatMessage::system(
        id,
        "chat-1",
        ChatAuthor::new("UCmod", "moderator"),
        MessageKind::MessageDeleted,
    )
}

fn engine(transport: &MockTransport, auth: &MockAuthProvider) -> LiveChat {
    engine_with(EngineConfig::new("chat-1"), transport, auth)
}

fn engine_with(config: EngineConfig, transport: &MockTransport, auth: &MockAuthProvider) -> LiveChat {
    LiveChat::new(config, Arc::new(auth.clone()), Arc::new(transport.clone()))
}

async fn recv(rx: &mut Receiver<ChatEvent>) -> ChatEvent {
    timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events up to and including the first one matching `stop`
async fn recv_until(rx: &mut Receiver<ChatEvent>, stop: impl Fn(&ChatEvent) -> bool) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    loop {
        let event = recv(rx).await;
        let done = stop(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Paused time lands on timer deadlines, up to timer-wheel rounding
fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

fn chat_ids(events: &[ChatEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Chat(m) => Some(m.id.clone()),
            _ => None,
        })
        .collect()
}

fn count(events: &[ChatEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

// =============================================================================
// SCENARIO: seed, surface new message, surface rejection, fall back
// =============================================================================
#[tokio::test(start_paused = true)]
async fn scenario_seed_then_chat_then_rejection() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old"), text("b", "old")], Some("p1"), Duration::from_secs(5))
        .page(
            vec![text("a", "old"), text("b", "old"), text("c", "hi")],
            Some("p2"),
            Duration::from_secs(5),
        )
        .fail(ApiError::with_reason(404, "liveChatNotFound", "The live chat could not be found."));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    assert_eq!(recv(&mut rx).await, ChatEvent::Connected);

    // First cycle seeds silently
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);
    assert_eq!(chat.known_messages(), 2);

    // Second cycle surfaces exactly "c"
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    assert_eq!(chat_ids(&events), vec!["c"]);
    assert_eq!(chat.known_messages(), 3);
    match &events[0] {
        ChatEvent::Chat(m) => assert_eq!(m.text.as_deref(), Some("hi")),
        other => panic!("expected chat, got {:?}", other),
    }

    // Third cycle fails: one error, no refresh
    let error = recv(&mut rx).await;
    match error {
        ChatEvent::Error(e) => assert_eq!(e.reason(), Some("liveChatNotFound")),
        other => panic!("expected error, got {:?}", other),
    }
    let failed_at = Instant::now();
    assert_eq!(auth.refresh_count(), 0);

    // Next cycle still scheduled, at the fallback interval
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);
    assert_elapsed(failed_at, Duration::from_secs(10));
    tokio::task::yield_now().await;

    let tokens: Vec<Option<String>> = transport
        .list_calls()
        .into_iter()
        .map(|r| r.page_token)
        .collect();
    assert_eq!(
        &tokens[..4],
        &[None, Some("p1".to_string()), Some("p2".to_string()), Some("p2".to_string())]
    );

    chat.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_list_request_carries_config() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    tokio::task::yield_now().await;
    chat.disconnect();

    let request = &transport.list_calls()[0];
    assert_eq!(request.live_chat_id, "chat-1");
    assert_eq!(request.max_results, 2000);
    assert_eq!(request.parts, vec!["snippet", "authorDetails"]);
    assert!(request.page_token.is_none());
}

// =============================================================================
// Interval selection
// =============================================================================
#[tokio::test(start_paused = true)]
async fn test_server_interval_paces_cycles() {
    let transport = MockTransport::new()
        .page(vec![], Some("p1"), Duration::from_millis(4500))
        .page(vec![], Some("p2"), Duration::from_millis(4500));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    let first = Instant::now();
    recv(&mut rx).await;
    assert_elapsed(first, Duration::from_millis(4500));
    chat.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_minimum_interval_slows_polling() {
    let transport = MockTransport::new()
        .page(vec![], Some("p1"), Duration::from_secs(5))
        .page(vec![], Some("p2"), Duration::from_secs(5));
    let auth = MockAuthProvider::new("token");
    let config = EngineConfig::new("chat-1").with_minimum_interval(Duration::from_secs(30));
    let chat = engine_with(config, &transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    let first = Instant::now();
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);
    assert_elapsed(first, Duration::from_secs(30));
    chat.disconnect();
}

// =============================================================================
// Dedup behaviour through the engine
// =============================================================================
#[tokio::test(start_paused = true)]
async fn test_system_events_never_surface() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old")], Some("p1"), Duration::from_secs(1))
        .page(vec![deleted("d1"), deleted("d2")], Some("p2"), Duration::from_secs(1))
        .page(vec![text("b", "new")], Some("p3"), Duration::from_secs(1));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Chat(_))).await;
    chat.disconnect();

    assert_eq!(chat_ids(&events), vec!["b"]);
    assert_eq!(count(&events, "polling"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_first_page_primes_ledger() {
    let transport = MockTransport::new()
        .page(vec![], Some("p1"), Duration::from_secs(1))
        .page(vec![text("a", "first!")], Some("p2"), Duration::from_secs(1));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Chat(_))).await;
    chat.disconnect();

    assert_eq!(chat_ids(&events), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_page_larger_than_event_capacity_is_delivered_whole() {
    let burst: Vec<ChatMessage> = (0..300).map(|i| text(&format!("m{}", i), "spam")).collect();
    let transport = MockTransport::new()
        .page(vec![], Some("p1"), Duration::from_secs(1))
        .page(burst, Some("p2"), Duration::from_secs(1));
    let auth = MockAuthProvider::new("token");
    let config = EngineConfig::new("chat-1");
    assert!(config.event_capacity < 300);
    let chat = engine_with(config, &transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);

    // recv fails on a lagged receiver, so every chat must be buffered
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    chat.disconnect();

    let ids = chat_ids(&events);
    assert_eq!(ids.len(), 300);
    assert_eq!(ids.first().map(String::as_str), Some("m0"));
    assert_eq!(ids.last().map(String::as_str), Some("m299"));
    assert_eq!(chat.known_messages(), 300);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_capacity_bounds_the_ledger() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old"), text("b", "old")], Some("p1"), Duration::from_secs(1))
        .page(
            vec![text("a", "old"), text("b", "old"), text("c", "new")],
            Some("p2"),
            Duration::from_secs(1),
        )
        .page(vec![text("a", "old")], Some("p3"), Duration::from_secs(1));
    let auth = MockAuthProvider::new("token");
    let config = EngineConfig {
        dedup_capacity: Some(2),
        ..EngineConfig::new("chat-1")
    };
    let chat = engine_with(config, &transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| {
        matches!(e, ChatEvent::Chat(m) if m.id == "a")
    })
    .await;
    chat.disconnect();

    // "a" was evicted when "c" arrived, so it reads as new again
    assert_eq!(chat_ids(&events), vec!["c", "a"]);
    assert_eq!(chat.known_messages(), 2);
}

// =============================================================================
// Auth expiry recovery
// =============================================================================
#[tokio::test(start_paused = true)]
async fn test_auth_error_refreshes_once_and_keeps_polling() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old")], Some("p1"), Duration::from_secs(2))
        .fail(ApiError::with_reason(401, "authError", "Invalid Credentials"))
        .page(vec![text("a", "old"), text("b", "new")], Some("p2"), Duration::from_secs(2));
    let auth = MockAuthProvider::new("initial");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Chat(_))).await;
    chat.disconnect();

    assert_eq!(auth.refresh_count(), 1);
    assert_eq!(count(&events, "error"), 0);
    assert_eq!(count(&events, "refreshing"), 1);
    assert!(events.contains(&ChatEvent::Tokens(
        Credentials::new("refreshed-1").with_refresh_token("refresh-token")
    )));
    assert_eq!(chat_ids(&events), vec!["b"]);

    // Failed cycle kept the cursor and the retry used the rotated token
    let calls = transport.list_calls();
    assert_eq!(calls[2].page_token.as_deref(), Some("p1"));
    assert_eq!(transport.tokens_seen(), vec!["initial", "initial", "refreshed-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_is_surfaced() {
    let transport = MockTransport::new()
        .fail(ApiError::with_reason(401, "authError", "Invalid Credentials"));
    let auth = MockAuthProvider::new("initial")
        .fail_next_refresh(AuthError::with_reason("invalid_grant", "Token has been revoked"));
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Error(_))).await;
    chat.disconnect();

    match events.last() {
        Some(ChatEvent::Error(LiveChatError::Auth(e))) => {
            assert_eq!(e.reason.as_deref(), Some("invalid_grant"));
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_is_surfaced_and_falls_back() {
    let transport = MockTransport::new()
        .fail(ApiError::transport("connection reset by peer"))
        .page(vec![], None, Duration::from_secs(1));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Error(_))).await;
    assert!(matches!(events.last(), Some(ChatEvent::Error(LiveChatError::Api(e))) if e.is_transport()));

    let failed_at = Instant::now();
    assert_eq!(recv(&mut rx).await, ChatEvent::Polling);
    assert_elapsed(failed_at, Duration::from_secs(10));
    assert_eq!(auth.refresh_count(), 0);
    chat.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_connect_refreshes_missing_access_token() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Tokens(_))).await;
    chat.disconnect();

    assert!(auth.refresh_count() >= 1);
}

// =============================================================================
// Lifecycle
// =============================================================================
#[tokio::test(start_paused = true)]
async fn test_connect_twice_is_rejected() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);

    chat.connect().unwrap();
    assert_eq!(chat.connect(), Err(LiveChatError::AlreadyConnected));
    assert_eq!(chat.state(), ConnectionState::Connected);
    chat.disconnect();
    assert_eq!(chat.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_polling() {
    let transport = MockTransport::new().idle_interval(Duration::from_secs(5));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    recv(&mut rx).await;
    chat.disconnect();
    assert_eq!(recv(&mut rx).await, ChatEvent::Disconnected);

    let polls = transport.list_count();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.list_count(), polls);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_fetch_is_discarded_after_disconnect() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old")], Some("p1"), Duration::from_secs(1))
        .step(ListStep {
            delay: Some(Duration::from_secs(5)),
            result: Ok(ListPage {
                items: vec![text("a", "old"), text("b", "late")],
                next_page_token: Some("p2".to_string()),
                polling_interval: Duration::from_secs(1),
            }),
        });
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    // Connected, seed cycle, then the slow cycle starts
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    tokio::task::yield_now().await;
    assert_eq!(transport.list_count(), 2);

    chat.disconnect();
    assert_eq!(recv(&mut rx).await, ChatEvent::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(transport.list_count(), 2);
    assert_eq!(chat.cursor().page_token.as_deref(), Some("p1"));
    assert_eq!(chat.known_messages(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_when_disconnected_is_silent() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.disconnect();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_keeps_ledger_and_rebinds_credentials() {
    let transport = MockTransport::new()
        .page(vec![text("a", "old"), text("b", "old")], Some("p1"), Duration::from_secs(1))
        .page(
            vec![text("a", "old"), text("b", "old"), text("c", "after")],
            Some("p2"),
            Duration::from_secs(1),
        );
    let auth = MockAuthProvider::new("first");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    assert_eq!(chat.known_messages(), 2);

    auth.set_credentials(Credentials::new("second"));
    chat.reconnect().unwrap();

    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Chat(_))).await;
    chat.disconnect();

    let names: Vec<&str> = events.iter().take(3).map(|e| e.name()).collect();
    assert_eq!(names, vec!["disconnected", "connected", "reconnected"]);
    assert_eq!(chat_ids(&events), vec!["c"]);
    assert_eq!(transport.list_calls()[1].page_token.as_deref(), Some("p1"));
    assert_eq!(transport.tokens_seen().last().map(String::as_str), Some("second"));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_disconnected_just_connects() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.reconnect().unwrap();
    assert!(chat.is_connected());

    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    chat.disconnect();

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["connected", "reconnected", "polling"]);
}

#[tokio::test(start_paused = true)]
async fn test_provider_rotation_is_forwarded() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;

    let rotated = Credentials::new("rotated").with_refresh_token("r2");
    auth.rotate(rotated.clone());
    let events = recv_until(&mut rx, |e| matches!(e, ChatEvent::Tokens(_))).await;
    chat.disconnect();

    assert_eq!(events.last(), Some(&ChatEvent::Tokens(rotated)));
}

// =============================================================================
// say / delete
// =============================================================================
#[tokio::test]
async fn test_say_resolves_with_server_copy() {
    let echoed = ChatMessage::text("x", "chat-1", ChatAuthor::new("UCself", "bot"), "hi");
    let transport = MockTransport::new().respond_insert(echoed.clone());
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    let sent = chat.say("hi").await.unwrap();
    assert_eq!(sent, echoed);
    assert_eq!(transport.insert_calls(), vec!["hi"]);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_say_failure_rejects_and_emits() {
    let transport = MockTransport::new()
        .fail_insert(ApiError::with_reason(403, "forbidden", "Not allowed to post"));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    let err = chat.say("hi").await.unwrap_err();
    assert_eq!(err.reason(), Some("forbidden"));
    match rx.try_recv() {
        Ok(ChatEvent::Error(e)) => assert_eq!(e, err),
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_say_auth_failure_refreshes_instead_of_error_event() {
    let transport = MockTransport::new()
        .fail_insert(ApiError::with_reason(401, "authError", "Invalid Credentials"));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    let err = chat.say("hi").await.unwrap_err();
    assert_eq!(err.reason(), Some("authError"));
    assert_eq!(recv(&mut rx).await, ChatEvent::Refreshing);

    // Let the spawned refresh run
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(auth.refresh_count(), 1);
    assert!(!matches!(rx.try_recv(), Ok(ChatEvent::Error(_))));
}

#[tokio::test]
async fn test_delete_records_and_surfaces_failure() {
    let transport = MockTransport::new()
        .fail_delete(ApiError::with_reason(404, "liveChatMessageNotFound", "gone"));
    let auth = MockAuthProvider::new("token");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    let err = chat.delete("m1").await.unwrap_err();
    assert_eq!(err.reason(), Some("liveChatMessageNotFound"));
    assert!(matches!(rx.try_recv(), Ok(ChatEvent::Error(_))));

    chat.delete("m2").await.unwrap();
    assert_eq!(transport.delete_calls(), vec!["m1", "m2"]);
}

#[tokio::test(start_paused = true)]
async fn test_say_uses_bound_credentials_while_connected() {
    let transport = MockTransport::new();
    let auth = MockAuthProvider::new("bound");
    let chat = engine(&transport, &auth);
    let mut rx = chat.subscribe();

    chat.connect().unwrap();
    recv_until(&mut rx, |e| matches!(e, ChatEvent::Polling)).await;
    auth.set_credentials(Credentials::new("unbound"));

    chat.say("hello").await.unwrap();
    chat.disconnect();
    chat.say("again").await.unwrap();

    let tokens = transport.tokens_seen();
    let n = tokens.len();
    assert_eq!(&tokens[n - 2..], &["bound".to_string(), "unbound".to_string()]);
}
