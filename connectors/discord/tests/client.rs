//! End-to-end tests: gateway frames flowing through the mux into the cache and
//! user handlers.

use std::sync::Arc;
use std::time::Duration;

use dgw_discord::events::{
    CHANNEL_CREATE, CLIENT_ERROR, GUILD_CREATE, GUILD_MEMBER_ADD, MESSAGE_CREATE,
};
use dgw_discord::{
    Channel, ClientErrorReport, ConnectionState, DiscordClient, DiscordConfig, DiscordError,
    DrainPolicy, EntityKind, FaultKind, GatewayHandle, Message, ReconnectConfig,
};
use dgw_testkit::{fixtures, MockGateway, MockSession};
use parking_lot::Mutex;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

// ─── Harness ───────────────────────────────────────────────────────────────

async fn connected(gateway: &MockGateway, client: &DiscordClient) -> (GatewayHandle, MockSession) {
    let handle = client.connect();
    let mut session = gateway.next_session().await;
    session.send_json(fixtures::hello(45_000));
    session.expect_op(2).await;
    session.send_json(fixtures::ready(1, "sess-1", &gateway.url(), &["10"]));
    handle
        .wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .unwrap();
    (handle, session)
}

fn client_for(gateway: &MockGateway) -> DiscordClient {
    DiscordClient::new(DiscordConfig::new("test-token").with_gateway_url(gateway.url())).unwrap()
}

fn reports(client: &DiscordClient) -> Arc<Mutex<Vec<ClientErrorReport>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(CLIENT_ERROR, move |report: ClientErrorReport| {
        sink.lock().push(report);
        Ok(())
    });
    seen
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─── Cache ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cache_follows_gateway() {
    dgw_testkit::init_test_tracing();
    let gateway = MockGateway::start().await;
    let client = client_for(&gateway);
    let errors = reports(&client);

    // Handlers run after the cache, so the new channel is already visible.
    let visible = Arc::new(Mutex::new(Vec::new()));
    {
        let visible = Arc::clone(&visible);
        let cache = client.cache().clone();
        client.on(CHANNEL_CREATE, move |channel: Channel| {
            visible.lock().push(cache.channel(&channel.id).is_some());
            Ok(())
        });
    }

    let (handle, session) = connected(&gateway, &client).await;
    assert!(client.cache().guild("10").is_some_and(|g| g.unavailable));

    session.send_json(fixtures::dispatch(
        2,
        GUILD_CREATE,
        fixtures::guild("10", "Guild", &[fixtures::guild_channel("20", "10", "general")]),
    ));
    session.send_json(fixtures::dispatch(
        3,
        CHANNEL_CREATE,
        fixtures::guild_channel("21", "10", "random"),
    ));
    let mut member = fixtures::member("2000", "someone");
    member["guild_id"] = json!("10");
    session.send_json(fixtures::dispatch(4, GUILD_MEMBER_ADD, member));
    session.send_json(fixtures::dispatch(
        5,
        CHANNEL_CREATE,
        fixtures::guild_channel("30", "99", "orphan"),
    ));

    eventually("orphan channel fault", || !errors.lock().is_empty()).await;

    let cache = client.cache();
    let guild = cache.guild("10").unwrap();
    assert_eq!(guild.name, "Guild");
    assert!(!guild.unavailable);
    let channels: Vec<String> = cache
        .guild_channels("10")
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(channels, vec!["20", "21"]);
    assert_eq!(
        cache.member("10", "2000").and_then(|m| m.user).map(|u| u.username),
        Some("someone".to_string())
    );
    assert!(cache.channel("30").is_none());
    assert!(visible.lock()[0]);

    let report = errors.lock()[0].clone();
    assert_eq!(report.kind, "consistency_fault");
    assert_eq!(report.type_tag.as_deref(), Some(CHANNEL_CREATE));
    assert_eq!(report.sequence, Some(5));
    let fault = report.fault.unwrap();
    assert_eq!(fault.kind, FaultKind::UnknownParent);
    assert_eq!(fault.entity, EntityKind::Channel);
    assert_eq!(fault.parent.as_deref(), Some("99"));

    handle.shutdown(DrainPolicy::Drain).await.unwrap();
}

#[tokio::test]
async fn test_resume_replay_reaches_cache_in_order() {
    let gateway = MockGateway::start().await;
    let config = DiscordConfig::new("test-token")
        .with_gateway_url(gateway.url())
        .with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        });
    let client = DiscordClient::new(config).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        client.on(CHANNEL_CREATE, move |channel: Channel| {
            order.lock().push(channel.id);
            Ok(())
        });
    }

    let (handle, first) = connected(&gateway, &client).await;
    first.send_json(fixtures::dispatch(100, GUILD_CREATE, fixtures::guild("10", "Guild", &[])));
    let cache = client.cache().clone();
    eventually("guild snapshot", || {
        cache.guild("10").is_some_and(|g| !g.unavailable)
    })
    .await;
    first.drop_connection();

    let mut second = gateway.next_session().await;
    second.send_json(fixtures::hello(45_000));
    let resume = second.expect_op(6).await;
    assert_eq!(resume["d"]["seq"], 100);
    for seq in 101..=103_u64 {
        let id = seq.to_string();
        second.send_json(fixtures::dispatch(
            seq,
            CHANNEL_CREATE,
            fixtures::guild_channel(&id, "10", "replayed"),
        ));
    }
    second.send_json(fixtures::resumed(104));
    handle
        .wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .unwrap();

    assert_eq!(*order.lock(), vec!["101", "102", "103"]);
    let ids: Vec<String> = cache
        .guild_channels("10")
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["101", "102", "103"]);

    handle.shutdown(DrainPolicy::Drain).await.unwrap();
}

// ─── Handlers ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_handler_error_reported_with_context() {
    let gateway = MockGateway::start().await;
    let client = client_for(&gateway);
    let errors = reports(&client);
    client.on(MESSAGE_CREATE, |_message: Message| {
        Err(DiscordError::handler("boom"))
    });

    let (handle, session) = connected(&gateway, &client).await;
    session.send_json(fixtures::dispatch(
        2,
        MESSAGE_CREATE,
        fixtures::message("m2", "5", "hi"),
    ));

    eventually("handler error report", || !errors.lock().is_empty()).await;
    let report = errors.lock()[0].clone();
    assert_eq!(report.kind, "handler");
    assert_eq!(report.type_tag.as_deref(), Some(MESSAGE_CREATE));
    assert_eq!(report.sequence, Some(2));
    assert!(report.message.contains("boom"));
    assert_eq!(handle.state(), ConnectionState::Connected);

    handle.shutdown(DrainPolicy::Drain).await.unwrap();
}

#[tokio::test]
async fn test_drain_waits_for_worker_handlers() {
    let gateway = MockGateway::start().await;
    let client = client_for(&gateway);

    let routed = Arc::new(Mutex::new(0_usize));
    {
        let routed = Arc::clone(&routed);
        client.on(MESSAGE_CREATE, move |_message: Message| {
            *routed.lock() += 1;
            Ok(())
        });
    }
    let finished = Arc::new(Mutex::new(Vec::new()));
    {
        let finished = Arc::clone(&finished);
        client.mux().on_worker(MESSAGE_CREATE, move |message: Message| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.lock().push(message.id);
                Ok(())
            }
        });
    }

    let (handle, session) = connected(&gateway, &client).await;
    session.send_json(fixtures::dispatch(
        2,
        MESSAGE_CREATE,
        fixtures::message("m2", "5", "slow"),
    ));
    eventually("sync handler", || *routed.lock() == 1).await;
    assert!(finished.lock().is_empty());

    handle.shutdown(DrainPolicy::Drain).await.unwrap();
    assert_eq!(*finished.lock(), vec!["m2"]);
}
