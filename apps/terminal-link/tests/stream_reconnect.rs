//! Stream Recovery Integration Tests
//!
//! Tests that server-push subscriptions survive reconnects as one continuous
//! sequence, end correctly, and release the underlying streams.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rust_decimal_macros::dec;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::Code;

use common::{StreamPlan, StreamStep, connected_session, wait_until};
use terminal_link::{
    CallOutcome, GatewayError, SessionHeaders, StreamDescriptor, TerminalPort, Tick,
    classify_reply,
};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn ticks_continue_across_session_loss() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![
        StreamStep::Tick(dec!(1.1000)),
        StreamStep::Tick(dec!(1.1001)),
        StreamStep::SessionLost,
    ]));
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.1002))]));

    let cancel = CancellationToken::new();
    let stream = session
        .client()
        .stream_ticks(vec!["EURUSD".to_string()], cancel.clone());
    let mut stream = Box::pin(stream);

    let mut bids = Vec::new();
    for _ in 0..3 {
        let tick = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        bids.push(tick.bid);
    }

    assert_eq!(bids, vec![dec!(1.1000), dec!(1.1001), dec!(1.1002)]);
    assert_eq!(gateway.connects(), 2);
    assert_eq!(
        gateway.stream_tokens(),
        vec![
            Some("session-1".to_string()),
            Some("session-2".to_string())
        ]
    );
    assert_eq!(gateway.live_streams(), 1, "interrupted stream was released");
}

#[tokio::test]
async fn transport_failure_mid_stream_reopens() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![
        StreamStep::Tick(dec!(1.2000)),
        StreamStep::Unavailable,
    ]));
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.2005))]));

    let cancel = CancellationToken::new();
    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], cancel),
    );

    let first = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    let second = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();

    assert_eq!(first.bid, dec!(1.2000));
    assert_eq!(second.bid, dec!(1.2005));
    assert_eq!(gateway.streams_opened(), 2);
}

#[tokio::test]
async fn unavailable_opener_reconnects() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::OpenFails(Code::Unavailable));
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.3000))]));

    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], CancellationToken::new()),
    );

    let tick = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(tick.bid, dec!(1.3000));
    assert_eq!(gateway.connects(), 2);
}

#[tokio::test]
async fn other_opener_failure_is_fatal() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::OpenFails(Code::PermissionDenied));

    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], CancellationToken::new()),
    );

    let item = timeout(WAIT, stream.next()).await.unwrap().unwrap();
    match item {
        Err(GatewayError::Transport(status)) => assert_eq!(status.code(), Code::PermissionDenied),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
    assert_eq!(gateway.connects(), 1);
}

#[tokio::test]
async fn fatal_item_ends_the_sequence() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![
        StreamStep::Tick(dec!(1.1000)),
        StreamStep::Remote("SYMBOL_NOT_FOUND"),
        StreamStep::Tick(dec!(1.1001)),
    ]));

    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], CancellationToken::new()),
    );

    assert!(timeout(WAIT, stream.next()).await.unwrap().unwrap().is_ok());
    match timeout(WAIT, stream.next()).await.unwrap().unwrap() {
        Err(GatewayError::Remote(error)) => assert_eq!(error.code, "SYMBOL_NOT_FOUND"),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
    assert!(wait_until(WAIT, || gateway.live_streams() == 0).await);
}

#[tokio::test]
async fn server_close_ends_cleanly() {
    let (gateway, session) = connected_session().await;
    gateway.plan_trades(StreamPlan::closing(vec![
        StreamStep::Trade(11),
        StreamStep::Trade(12),
    ]));

    let events: Vec<_> = timeout(
        WAIT,
        session
            .client()
            .stream_trade_events(CancellationToken::new())
            .collect(),
    )
    .await
    .unwrap();

    let tickets: Vec<u64> = events.into_iter().map(|e| e.unwrap().ticket).collect();
    assert_eq!(tickets, vec![11, 12]);
    assert_eq!(gateway.streams_opened(), 1);
    assert_eq!(gateway.live_streams(), 0);
}

#[tokio::test]
async fn cancellation_yields_one_cancelled_item() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.1000))]));

    let cancel = CancellationToken::new();
    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], cancel.clone()),
    );

    assert!(timeout(WAIT, stream.next()).await.unwrap().unwrap().is_ok());
    cancel.cancel();

    let item = timeout(WAIT, stream.next()).await.unwrap().unwrap();
    assert!(matches!(item, Err(GatewayError::Cancelled)));
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
    assert!(wait_until(WAIT, || gateway.live_streams() == 0).await);
}

#[tokio::test]
async fn dropping_the_sequence_releases_the_stream() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.1000))]));

    let mut stream = Box::pin(
        session
            .client()
            .stream_ticks(vec!["EURUSD".to_string()], CancellationToken::new()),
    );
    assert!(timeout(WAIT, stream.next()).await.unwrap().unwrap().is_ok());
    assert_eq!(gateway.live_streams(), 1);

    drop(stream);
    assert_eq!(gateway.live_streams(), 0);
}

#[tokio::test]
async fn custom_stream_descriptor_projects_items() {
    let (gateway, session) = connected_session().await;
    gateway.plan_ticks(StreamPlan::holding(vec![
        StreamStep::Tick(dec!(1.5000)),
        StreamStep::SessionLost,
    ]));
    gateway.plan_ticks(StreamPlan::holding(vec![StreamStep::Tick(dec!(1.5010))]));

    let port = Arc::clone(&gateway);
    let open = move |headers: SessionHeaders| {
        let port = Arc::clone(&port);
        async move { port.subscribe_ticks(headers, vec!["XAUUSD".to_string()]).await }
    };
    let call = StreamDescriptor::new(
        "spread_feed",
        open,
        |reply| -> CallOutcome<Tick> { classify_reply(reply) },
        |tick: Tick| tick.ask - tick.bid,
    );

    let mut stream = Box::pin(session.execute_stream(call, CancellationToken::new()));

    let first = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    let second = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first, dec!(0.0002));
    assert_eq!(second, dec!(0.0002));
    assert_eq!(gateway.connects(), 2);
}
