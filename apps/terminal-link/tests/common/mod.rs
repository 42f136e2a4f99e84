//! In-memory terminal gateway shared by the integration tests.
//!
//! Issues numbered session tokens, rejects calls carrying anything but the
//! current token with `TERMINAL_INSTANCE_NOT_FOUND`, and replays scripted
//! faults and subscription plans.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, stream};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tonic::{Code, Status};

use terminal_link::application::ports::{
    PositionModify, RawReply, RemoteStream, TERMINAL_INSTANCE_NOT_FOUND,
};
use terminal_link::application::services::{
    BackoffConfig, ExecutorSettings, SessionSettings, TrailingSettings,
};
use terminal_link::{
    Addressing, Credentials, GatewayError, PositionSide, PositionSnapshot, PriceSource,
    ProtectiveLevel, RemoteError, SessionConnector, SessionHeaders, SessionIdentity, SessionToken,
    TerminalPort, TerminalSession, Tick, TradeEvent, TradeEventKind, VolumeConstraint,
};

/// Fault injected into the next unary call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Transport reports the endpoint unavailable.
    Unavailable,
    /// Gateway lost the terminal instance; the current token is invalidated.
    SessionLost,
    /// Gateway returns a structured error with this code.
    Remote(&'static str),
}

/// One item of a scripted subscription.
#[derive(Debug, Clone)]
pub enum StreamStep {
    /// Tick with this bid (tick subscriptions only).
    Tick(Decimal),
    /// Trade event for this ticket (trade subscriptions only).
    Trade(u64),
    /// Session-lost error item; the current token is invalidated.
    SessionLost,
    /// Transport failure mid-stream.
    Unavailable,
    /// Structured error with this code.
    Remote(&'static str),
}

/// What a subscription does once opened.
#[derive(Debug, Clone)]
pub enum StreamPlan {
    /// Opening fails with this transport code.
    OpenFails(Code),
    /// Emit the steps, then close or stay open.
    Emit {
        /// Items in order.
        steps: Vec<StreamStep>,
        /// Keep the stream open after the last step.
        hold: bool,
    },
}

impl StreamPlan {
    /// Emit `steps` and stay open.
    pub fn holding(steps: Vec<StreamStep>) -> Self {
        Self::Emit { steps, hold: true }
    }

    /// Emit `steps` and close.
    pub fn closing(steps: Vec<StreamStep>) -> Self {
        Self::Emit { steps, hold: false }
    }
}

#[derive(Debug)]
struct State {
    issued: u64,
    current: Option<String>,
    connect_unavailable: usize,
    connect_rejection: Option<&'static str>,
    faults: VecDeque<Fault>,
    bid: Decimal,
    volume: VolumeConstraint,
    stop_loss: Decimal,
    modify_faults: VecDeque<Fault>,
    modifications: Vec<Decimal>,
    tick_plans: VecDeque<StreamPlan>,
    trade_plans: VecDeque<StreamPlan>,
    unary_tokens: Vec<Option<String>>,
    stream_tokens: Vec<Option<String>>,
    released: Vec<String>,
}

/// Scripted gateway implementing both gateway ports.
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<State>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    unary_calls: AtomicUsize,
    streams_opened: AtomicUsize,
    live_streams: Arc<AtomicUsize>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                issued: 0,
                current: None,
                connect_unavailable: 0,
                connect_rejection: None,
                faults: VecDeque::new(),
                bid: dec!(1.1000),
                volume: VolumeConstraint::new(dec!(0.01), dec!(0.01), dec!(100)),
                stop_loss: Decimal::ZERO,
                modify_faults: VecDeque::new(),
                modifications: Vec::new(),
                tick_plans: VecDeque::new(),
                trade_plans: VecDeque::new(),
                unary_tokens: Vec::new(),
                stream_tokens: Vec::new(),
                released: Vec::new(),
            }),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            unary_calls: AtomicUsize::new(0),
            streams_opened: AtomicUsize::new(0),
            live_streams: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ---- scripting ----------------------------------------------------------

    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    pub fn fail_next_modify(&self, fault: Fault) {
        self.state.lock().modify_faults.push_back(fault);
    }

    pub fn fail_connects(&self, unavailable: usize) {
        self.state.lock().connect_unavailable = unavailable;
    }

    pub fn reject_connects(&self, code: &'static str) {
        self.state.lock().connect_rejection = Some(code);
    }

    /// Invalidate the current token as if the terminal instance restarted.
    pub fn expire_session(&self) {
        self.state.lock().current = None;
    }

    pub fn set_bid(&self, bid: Decimal) {
        self.state.lock().bid = bid;
    }

    pub fn set_stop_loss(&self, stop_loss: Decimal) {
        self.state.lock().stop_loss = stop_loss;
    }

    pub fn plan_ticks(&self, plan: StreamPlan) {
        self.state.lock().tick_plans.push_back(plan);
    }

    pub fn plan_trades(&self, plan: StreamPlan) {
        self.state.lock().trade_plans.push_back(plan);
    }

    // ---- observation --------------------------------------------------------

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn unary_calls(&self) -> usize {
        self.unary_calls.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    pub fn current_token(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    pub fn unary_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().unary_tokens.clone()
    }

    pub fn stream_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().stream_tokens.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.state.lock().released.clone()
    }

    pub fn modifications(&self) -> Vec<Decimal> {
        self.state.lock().modifications.clone()
    }

    // ---- internals ----------------------------------------------------------

    /// Validate the session and apply any scripted fault.
    fn admit<T>(&self, headers: &SessionHeaders, faults: FaultQueue) -> Option<RawReply<T>> {
        self.unary_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let token = headers.token().map(|t| t.as_str().to_string());
        state.unary_tokens.push(token.clone());

        if token.is_none() || token != state.current {
            return Some(Ok(Err(session_lost())));
        }

        let fault = match faults {
            FaultQueue::Any => state.faults.pop_front(),
            FaultQueue::Modify => state
                .modify_faults
                .pop_front()
                .or_else(|| state.faults.pop_front()),
        };

        match fault {
            None => None,
            Some(Fault::Unavailable) => Some(Err(Status::unavailable("gateway restarting"))),
            Some(Fault::SessionLost) => {
                state.current = None;
                Some(Ok(Err(session_lost())))
            }
            Some(Fault::Remote(code)) => Some(Ok(Err(RemoteError::new(code, "scripted")))),
        }
    }

    fn open<T: Send + 'static>(
        &self,
        headers: &SessionHeaders,
        plan: Option<StreamPlan>,
        project: fn(&StreamStep, &str) -> Option<T>,
        symbol: String,
    ) -> Result<RemoteStream<T>, Status> {
        let token = headers.token().map(|t| t.as_str().to_string());
        {
            let mut state = self.state.lock();
            state.stream_tokens.push(token.clone());
            if token.is_none() || token != state.current {
                drop(state);
                return Ok(self.track(stream::iter(vec![Ok(Err(session_lost()))]).boxed()));
            }
        }

        let (steps, hold) = match plan.unwrap_or_else(|| StreamPlan::holding(Vec::new())) {
            StreamPlan::OpenFails(code) => {
                return Err(Status::new(code, "scripted open failure"));
            }
            StreamPlan::Emit { steps, hold } => (steps, hold),
        };

        let items: Vec<RawReply<T>> = steps
            .iter()
            .filter_map(|step| match step {
                StreamStep::SessionLost => {
                    self.state.lock().current = None;
                    Some(Ok(Err(session_lost())))
                }
                StreamStep::Unavailable => Some(Err(Status::unavailable("connection reset"))),
                StreamStep::Remote(code) => Some(Ok(Err(RemoteError::new(*code, "scripted")))),
                other => project(other, &symbol).map(|item| Ok(Ok(item))),
            })
            .collect();

        let items = stream::iter(items);
        let stream = if hold {
            items.chain(stream::pending()).boxed()
        } else {
            items.boxed()
        };
        Ok(self.track(stream))
    }

    fn track<T: Send + 'static>(
        &self,
        inner: Pin<Box<dyn Stream<Item = RawReply<T>> + Send>>,
    ) -> RemoteStream<T> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.live_streams.fetch_add(1, Ordering::SeqCst);
        Box::pin(Tracked {
            inner,
            live: Arc::clone(&self.live_streams),
        })
    }
}

enum FaultQueue {
    Any,
    Modify,
}

/// Stream wrapper that counts itself out when dropped.
struct Tracked<T> {
    inner: Pin<Box<dyn Stream<Item = RawReply<T>> + Send>>,
    live: Arc<AtomicUsize>,
}

impl<T> Stream for Tracked<T> {
    type Item = RawReply<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn session_lost() -> RemoteError {
    RemoteError::new(TERMINAL_INSTANCE_NOT_FOUND, "terminal instance not found")
}

pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn tick(symbol: &str, bid: Decimal) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        bid,
        ask: bid + dec!(0.0002),
        last: bid,
        time: fixed_time(),
    }
}

fn tick_step(step: &StreamStep, symbol: &str) -> Option<Tick> {
    match step {
        StreamStep::Tick(bid) => Some(tick(symbol, *bid)),
        _ => None,
    }
}

fn trade_step(step: &StreamStep, _symbol: &str) -> Option<TradeEvent> {
    match step {
        StreamStep::Trade(ticket) => Some(TradeEvent {
            ticket: *ticket,
            symbol: "EURUSD".to_string(),
            kind: TradeEventKind::Modified,
            time: fixed_time(),
        }),
        _ => None,
    }
}

#[async_trait]
impl SessionConnector for FakeGateway {
    async fn connect(&self, _identity: &SessionIdentity) -> Result<SessionToken, GatewayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();

        if state.connect_unavailable > 0 {
            state.connect_unavailable -= 1;
            return Err(Status::unavailable("gateway not reachable").into());
        }
        if let Some(code) = state.connect_rejection {
            return Err(RemoteError::new(code, "rejected").into());
        }

        state.issued += 1;
        let token = format!("session-{}", state.issued);
        state.current = Some(token.clone());
        Ok(SessionToken::new(token).unwrap())
    }

    async fn disconnect(&self, token: &SessionToken) -> Result<(), GatewayError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.released.push(token.as_str().to_string());
        if state.current.as_deref() == Some(token.as_str()) {
            state.current = None;
        }
        Ok(())
    }
}

#[async_trait]
impl TerminalPort for FakeGateway {
    async fn symbol_tick(&self, headers: SessionHeaders, symbol: &str) -> RawReply<Tick> {
        if let Some(reply) = self.admit(&headers, FaultQueue::Any) {
            return reply;
        }
        let bid = self.state.lock().bid;
        Ok(Ok(tick(symbol, bid)))
    }

    async fn symbol_volume(
        &self,
        headers: SessionHeaders,
        _symbol: &str,
    ) -> RawReply<VolumeConstraint> {
        if let Some(reply) = self.admit(&headers, FaultQueue::Any) {
            return reply;
        }
        Ok(Ok(self.state.lock().volume))
    }

    async fn position(&self, headers: SessionHeaders, ticket: u64) -> RawReply<PositionSnapshot> {
        if let Some(reply) = self.admit(&headers, FaultQueue::Any) {
            return reply;
        }
        let stop_loss = self.state.lock().stop_loss;
        Ok(Ok(PositionSnapshot {
            ticket,
            symbol: "EURUSD".to_string(),
            side: PositionSide::Long,
            volume: dec!(1),
            stop_loss: ProtectiveLevel::from_raw(stop_loss),
            take_profit: ProtectiveLevel::Unset,
        }))
    }

    async fn modify_position(
        &self,
        headers: SessionHeaders,
        change: PositionModify,
    ) -> RawReply<()> {
        if let Some(reply) = self.admit(&headers, FaultQueue::Modify) {
            return reply;
        }
        let mut state = self.state.lock();
        if let Some(stop_loss) = change.stop_loss {
            state.stop_loss = stop_loss;
            state.modifications.push(stop_loss);
        }
        Ok(Ok(()))
    }

    async fn subscribe_ticks(
        &self,
        headers: SessionHeaders,
        symbols: Vec<String>,
    ) -> Result<RemoteStream<Tick>, Status> {
        let plan = self.state.lock().tick_plans.pop_front();
        let symbol = symbols.first().cloned().unwrap_or_default();
        self.open(&headers, plan, tick_step, symbol)
    }

    async fn subscribe_trades(
        &self,
        headers: SessionHeaders,
    ) -> Result<RemoteStream<TradeEvent>, Status> {
        let plan = self.state.lock().trade_plans.pop_front();
        self.open(&headers, plan, trade_step, String::new())
    }
}

// =============================================================================
// Session wiring
// =============================================================================

pub const RETRY_DELAY: Duration = Duration::from_millis(10);

pub fn identity() -> SessionIdentity {
    SessionIdentity::new(
        Addressing::Cluster {
            name: "Broker-Demo".to_string(),
        },
        Credentials::new(5_012_345, "hunter2".to_string()),
    )
}

pub fn settings(price_source: PriceSource) -> SessionSettings {
    SessionSettings {
        executor: ExecutorSettings {
            retry_delay: RETRY_DELAY,
        },
        trailing: TrailingSettings {
            min_apply_interval: Duration::ZERO,
            max_consecutive_failures: 3,
            price_source,
        },
        connect_backoff: BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
    }
}

pub fn session_with(gateway: &Arc<FakeGateway>, price_source: PriceSource) -> TerminalSession {
    TerminalSession::new(
        Arc::clone(gateway) as Arc<dyn SessionConnector>,
        Arc::clone(gateway) as Arc<dyn TerminalPort>,
        settings(price_source),
    )
}

/// Session over a fresh gateway, already connected.
pub async fn connected_session() -> (Arc<FakeGateway>, TerminalSession) {
    let gateway = FakeGateway::new();
    let session = session_with(
        &gateway,
        PriceSource::Poll {
            interval: Duration::from_millis(5),
        },
    );
    session.connect(identity()).await.unwrap();
    (gateway, session)
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn wait_until(within: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
