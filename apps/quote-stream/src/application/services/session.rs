//! Stream Session
//!
//! One session per client connection. A session owns the connection's
//! upstream quote subscription and runs four tasks that share a single
//! cancellation token:
//!
//! - **pump**: pulls ticks from the upstream queue and routes them
//! - **upstream**: drives `MarketDataProvider::stream_quotes`
//! - **writer**: drains the outbound queue to the transport, sends heartbeats
//! - **reader**: watches the transport for liveness
//!
//! # Ordering
//!
//! Ticks for a connection flow through one pump, one FIFO outbound queue
//! and one writer, so the client sees them in upstream order.
//!
//! # Termination
//!
//! Whichever task first observes an end condition records the reason and
//! cancels the token; later reasons are ignored. On cancellation the writer
//! flushes what is already queued (bounded by `flush_timeout`) before
//! closing the transport, and the session leaves the registry exactly once.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use super::router::{BroadcastRouter, RouteOutcome};
use crate::application::ports::{
    Connection, Inbound, MarketDataProvider, ProviderError, SessionEvent, TransportError,
    TransportReader, TransportWriter,
};
use crate::domain::market::Symbol;
use crate::infrastructure::metrics;

/// Sent when a session has nothing to stream.
pub const NO_SYMBOLS_MESSAGE: &str = "No symbols tracked";

// =============================================================================
// Configuration
// =============================================================================

/// Per-session queue sizes and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Capacity of the outbound (to client) queue.
    pub outbound_capacity: usize,
    /// Capacity of the upstream (from provider) queue.
    pub upstream_capacity: usize,
    /// Upper bound on a single transport write.
    pub write_timeout: Duration,
    /// Interval between heartbeats. Zero disables them.
    pub heartbeat_interval: Duration,
    /// Session ends if the client sends nothing for this long.
    pub idle_timeout: Duration,
    /// Upper bound on flushing queued events after cancellation.
    pub flush_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            upstream_capacity: 256,
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Session Inputs and Outputs
// =============================================================================

/// Upstream source for a session.
pub enum Upstream {
    /// Nothing to subscribe to.
    None,
    /// A provider ready to stream.
    Provider(Arc<dyn MarketDataProvider>),
    /// Provider selection failed; the session reports it and ends.
    Unavailable(ProviderError),
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Provider(p) => f.debug_tuple("Provider").field(&p.name()).finish(),
            Self::Unavailable(e) => f.debug_tuple("Unavailable").field(e).finish(),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
    /// The client sent nothing within the idle timeout.
    IdleTimeout,
    /// A transport read or write failed.
    Transport(String),
    /// The upstream subscription failed or could not be opened.
    Upstream(String),
    /// Cancelled explicitly or by process shutdown.
    Cancelled,
    /// A session task panicked.
    Aborted,
}

impl SessionEnd {
    /// Short label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::IdleTimeout => "idle_timeout",
            Self::Transport(_) => "transport_error",
            Self::Upstream(_) => "upstream_error",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl From<TransportError> for SessionEnd {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => Self::ClientClosed,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: ConnectionId,
    cancel: CancellationToken,
    task: JoinHandle<SessionEnd>,
}

impl SessionHandle {
    /// The session's connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Ask the session to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether every session task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> SessionEnd {
        self.task.await.unwrap_or(SessionEnd::Aborted)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Shared collaborators for starting sessions.
#[derive(Debug, Clone)]
pub struct StreamSession {
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    config: SessionConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// First-writer-wins end reason plus the token it cancels.
#[derive(Clone)]
struct Termination {
    cancel: CancellationToken,
    reason: Arc<OnceLock<SessionEnd>>,
}

impl Termination {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            reason: Arc::new(OnceLock::new()),
        }
    }

    fn finish(&self, reason: SessionEnd) {
        let _ = self.reason.set(reason);
        self.cancel.cancel();
    }

    fn reason(&self) -> SessionEnd {
        self.reason.get().cloned().unwrap_or(SessionEnd::Cancelled)
    }
}

impl StreamSession {
    /// Create a session starter.
    ///
    /// Sessions are cancelled with `shutdown` and tracked by `tracker`, so
    /// callers can wait for them to drain.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: BroadcastRouter,
        config: SessionConfig,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            registry,
            router,
            config,
            shutdown,
            tracker,
        }
    }

    /// Start a session for `connection`.
    ///
    /// The connection is registered before this returns and unregistered
    /// when the session ends.
    pub fn start(
        &self,
        connection: Connection,
        symbols: Vec<Symbol>,
        upstream: Upstream,
    ) -> SessionHandle {
        let Connection {
            peer,
            writer,
            reader,
        } = connection;

        let cancel = self.shutdown.child_token();
        let end = Termination::new(cancel.clone());
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let symbols: Arc<[Symbol]> = Arc::from(symbols);

        let handle = ConnectionHandle::new(
            peer.clone(),
            outbound_tx.clone(),
            cancel.clone(),
            Arc::clone(&symbols),
        );
        let id = handle.id;
        let token = self.registry.register(handle);

        tracing::info!(
            connection_id = %id,
            peer = %peer,
            symbols = symbols.len(),
            "Session started"
        );

        let writer_task = tokio::spawn(run_writer(writer, outbound_rx, end.clone(), self.config));
        let reader_task = tokio::spawn(run_reader(reader, end.clone(), self.config.idle_timeout));

        let pump = Pump {
            router: self.router.clone(),
            outbound: outbound_tx,
            end: end.clone(),
            config: self.config,
        };
        let registry = Arc::clone(&self.registry);

        let task = self.tracker.spawn(async move {
            pump.run(&symbols, upstream).await;

            // Pump is done; make sure every other task winds down.
            end.cancel.cancel();
            registry.unregister(token);

            let _ = reader_task.await;
            let _ = writer_task.await;

            let reason = end.reason();
            tracing::info!(connection_id = %id, peer = %peer, reason = reason.as_str(), "Session ended");
            reason
        });

        SessionHandle { id, cancel, task }
    }
}

// =============================================================================
// Pump
// =============================================================================

struct Pump {
    router: BroadcastRouter,
    outbound: mpsc::Sender<SessionEvent>,
    end: Termination,
    config: SessionConfig,
}

impl Pump {
    async fn run(&self, symbols: &Arc<[Symbol]>, upstream: Upstream) {
        match upstream {
            _ if symbols.is_empty() => self.idle().await,
            Upstream::None => self.idle().await,
            Upstream::Unavailable(e) => self.fail(&e).await,
            Upstream::Provider(provider) => self.stream(Arc::clone(symbols), provider).await,
        }
    }

    /// Nothing to stream: announce it and wait for the connection to end.
    async fn idle(&self) {
        self.emit(SessionEvent::info(NO_SYMBOLS_MESSAGE)).await;
        self.end.cancel.cancelled().await;
    }

    async fn fail(&self, error: &ProviderError) {
        tracing::warn!(error = %error, "Upstream unavailable, ending session");
        self.emit(SessionEvent::error(format!("Provider error: {error}")))
            .await;
        self.end.finish(SessionEnd::Upstream(error.to_string()));
    }

    async fn stream(&self, symbols: Arc<[Symbol]>, provider: Arc<dyn MarketDataProvider>) {
        let (upstream_tx, mut upstream_rx) = mpsc::channel(self.config.upstream_capacity.max(1));
        let provider_name = provider.name().to_string();

        let mut upstream_task = {
            let cancel = self.end.cancel.clone();
            tokio::spawn(async move {
                provider
                    .stream_quotes(&symbols, upstream_tx, cancel)
                    .await
            })
        };

        let cancel = &self.end.cancel;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = upstream_rx.recv() => {
                    let Some(quote) = next else {
                        // Upstream dropped its sender: it has returned.
                        break;
                    };
                    metrics::record_tick_received(&provider_name);
                    match self.router.route(quote, &self.outbound, cancel).await {
                        RouteOutcome::Delivered | RouteOutcome::ClientFull => {}
                        RouteOutcome::ClientClosed => {
                            self.end.finish(SessionEnd::ClientClosed);
                            break;
                        }
                        RouteOutcome::Cancelled => break,
                    }
                }
            }
        }

        // Bounded wait for the provider to observe cancellation.
        let result = if cancel.is_cancelled() {
            match tokio::time::timeout(self.config.flush_timeout, &mut upstream_task).await {
                Ok(joined) => joined.ok(),
                Err(_) => {
                    tracing::warn!(provider = %provider_name, "Upstream did not stop in time, aborting");
                    upstream_task.abort();
                    let _ = upstream_task.await;
                    None
                }
            }
        } else {
            upstream_task.await.ok()
        };

        if cancel.is_cancelled() {
            return;
        }

        let error = match result {
            Some(Err(e)) => e,
            Some(Ok(())) => ProviderError::Unavailable("quote stream ended".to_string()),
            None => ProviderError::Unavailable("quote stream task failed".to_string()),
        };
        self.fail(&error).await;
    }

    /// Queue an event for the writer, giving up if the session is cancelled.
    async fn emit(&self, event: SessionEvent) {
        tokio::select! {
            biased;
            () = self.end.cancel.cancelled() => {}
            _ = self.outbound.send(event) => {}
        }
    }
}

// =============================================================================
// Writer and Reader
// =============================================================================

async fn write_one(
    writer: &mut dyn TransportWriter,
    event: &SessionEvent,
    timeout: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, writer.send(event)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

async fn run_writer(
    mut writer: Box<dyn TransportWriter>,
    mut outbound: mpsc::Receiver<SessionEvent>,
    end: Termination,
    config: SessionConfig,
) {
    let heartbeats = !config.heartbeat_interval.is_zero();
    let period = if heartbeats {
        config.heartbeat_interval
    } else {
        config.idle_timeout.max(Duration::from_secs(1))
    };
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            biased;
            () = end.cancel.cancelled() => break,
            next = outbound.recv() => match next {
                Some(event) => event,
                None => break,
            },
            _ = heartbeat.tick(), if heartbeats => SessionEvent::Heartbeat,
        };

        if let Err(e) = write_one(writer.as_mut(), &event, config.write_timeout).await {
            tracing::debug!(error = %e, "Write failed");
            end.finish(e.into());
            let _ = writer.close().await;
            return;
        }
    }

    // Flush whatever was queued before cancellation.
    let flush = async {
        while let Ok(event) = outbound.try_recv() {
            if write_one(writer.as_mut(), &event, config.write_timeout)
                .await
                .is_err()
            {
                break;
            }
        }
    };
    if tokio::time::timeout(config.flush_timeout, flush).await.is_err() {
        tracing::debug!("Outbound flush timed out");
    }

    let _ = writer.close().await;
}

async fn run_reader(mut reader: Box<dyn TransportReader>, end: Termination, idle_timeout: Duration) {
    loop {
        tokio::select! {
            biased;
            () = end.cancel.cancelled() => return,
            next = tokio::time::timeout(idle_timeout, reader.recv()) => match next {
                Ok(Ok(Inbound::Frame)) => {}
                Ok(Ok(Inbound::Closed)) => {
                    end.finish(SessionEnd::ClientClosed);
                    return;
                }
                Ok(Err(e)) => {
                    end.finish(e.into());
                    return;
                }
                Err(_) => {
                    end.finish(SessionEnd::IdleTimeout);
                    return;
                }
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::services::router::RouterConfig;
    use crate::domain::market::{Candle, HistoryPeriod, Quote};

    // -------------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct Sent(Arc<Mutex<Vec<SessionEvent>>>);

    impl Sent {
        fn events(&self) -> Vec<SessionEvent> {
            self.0
                .lock()
                .iter()
                .filter(|e| !matches!(e, SessionEvent::Heartbeat))
                .cloned()
                .collect()
        }
    }

    struct VecWriter(Sent);

    #[async_trait]
    impl TransportWriter for VecWriter {
        async fn send(&mut self, event: &SessionEvent) -> Result<(), TransportError> {
            self.0.0.lock().push(event.clone());
            Ok(())
        }
    }

    /// Reader driven by the test: each unit sent is one inbound frame;
    /// dropping the sender closes the connection.
    struct ChannelReader(mpsc::Receiver<()>);

    #[async_trait]
    impl TransportReader for ChannelReader {
        async fn recv(&mut self) -> Result<Inbound, TransportError> {
            Ok(match self.0.recv().await {
                Some(()) => Inbound::Frame,
                None => Inbound::Closed,
            })
        }
    }

    fn connection() -> (Connection, Sent, mpsc::Sender<()>) {
        let sent = Sent::default();
        let (frames_tx, frames_rx) = mpsc::channel(8);
        let conn = Connection::new(
            "test",
            Box::new(VecWriter(sent.clone())),
            Box::new(ChannelReader(frames_rx)),
        );
        (conn, sent, frames_tx)
    }

    struct ListProvider {
        prices: Vec<i64>,
        fail_after: bool,
    }

    #[async_trait]
    impl MarketDataProvider for ListProvider {
        fn name(&self) -> &str {
            "list"
        }

        async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
            Err(ProviderError::SymbolNotFound(symbol.to_string()))
        }

        async fn get_historical_data(
            &self,
            _symbol: &Symbol,
            _period: HistoryPeriod,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(vec![])
        }

        async fn stream_quotes(
            &self,
            symbols: &[Symbol],
            sink: mpsc::Sender<Quote>,
            cancel: CancellationToken,
        ) -> Result<(), ProviderError> {
            for price in &self.prices {
                let quote = Quote::new(symbols[0].clone(), Decimal::new(*price, 2));
                if sink.send(quote).await.is_err() {
                    return Ok(());
                }
            }
            if self.fail_after {
                return Err(ProviderError::Unavailable("feed dropped".into()));
            }
            cancel.cancelled().await;
            Ok(())
        }
    }

    /// Holds the upstream open forever and never looks at the token.
    struct DeafProvider {
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MarketDataProvider for DeafProvider {
        fn name(&self) -> &str {
            "deaf"
        }

        async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
            Err(ProviderError::SymbolNotFound(symbol.to_string()))
        }

        async fn get_historical_data(
            &self,
            _symbol: &Symbol,
            _period: HistoryPeriod,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(vec![])
        }

        async fn stream_quotes(
            &self,
            _symbols: &[Symbol],
            _sink: mpsc::Sender<Quote>,
            _cancel: CancellationToken,
        ) -> Result<(), ProviderError> {
            let _guard = SetOnDrop(Arc::clone(&self.dropped));
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn session_starter(
        shutdown: &CancellationToken,
    ) -> (StreamSession, mpsc::Receiver<Quote>, Arc<ConnectionRegistry>) {
        session_starter_with(shutdown, SessionConfig::default())
    }

    fn session_starter_with(
        shutdown: &CancellationToken,
        config: SessionConfig,
    ) -> (StreamSession, mpsc::Receiver<Quote>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (router, eval_rx) = BroadcastRouter::new(RouterConfig::default());
        let session = StreamSession::new(
            Arc::clone(&registry),
            router,
            config,
            shutdown.clone(),
            TaskTracker::new(),
        );
        (session, eval_rx, registry)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn prices(events: &[SessionEvent]) -> Vec<Decimal> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Quote { quote } => Some(quote.price),
                _ => None,
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn empty_symbol_set_goes_idle() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, registry) = session_starter(&shutdown);
        let (conn, sent, frames) = connection();

        let handle = starter.start(conn, vec![], Upstream::None);
        wait_until(|| !sent.events().is_empty()).await;
        assert_eq!(sent.events(), vec![SessionEvent::info(NO_SYMBOLS_MESSAGE)]);
        assert_eq!(registry.len(), 1);

        // Still alive after inbound traffic.
        frames.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(frames);
        assert_eq!(handle.join().await, SessionEnd::ClientClosed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn ticks_arrive_in_order_on_both_routes() {
        let shutdown = CancellationToken::new();
        let (starter, mut eval_rx, _registry) = session_starter(&shutdown);
        let (conn, sent, _frames) = connection();

        let provider = Arc::new(ListProvider {
            prices: vec![100, 101, 102, 103, 104],
            fail_after: false,
        });
        let handle = starter.start(conn, vec![Symbol::new("ACME")], Upstream::Provider(provider));

        wait_until(|| sent.events().len() == 5).await;
        let expected: Vec<Decimal> = (100..105).map(|p| Decimal::new(p, 2)).collect();
        assert_eq!(prices(&sent.events()), expected);

        let mut evaluated = Vec::new();
        for _ in 0..5 {
            evaluated.push(eval_rx.recv().await.unwrap().price);
        }
        assert_eq!(evaluated, expected);

        handle.cancel();
        assert_eq!(handle.join().await, SessionEnd::Cancelled);
    }

    #[tokio::test]
    async fn upstream_failure_sends_one_error_and_ends() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, registry) = session_starter(&shutdown);
        let (conn, sent, _frames) = connection();

        let provider = Arc::new(ListProvider {
            prices: vec![100],
            fail_after: true,
        });
        let handle = starter.start(conn, vec![Symbol::new("ACME")], Upstream::Provider(provider));

        let end = handle.join().await;
        assert!(matches!(end, SessionEnd::Upstream(_)));

        let events = sent.events();
        let errors = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(events.last(), Some(SessionEvent::Error { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unavailable_provider_reports_error() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, _registry) = session_starter(&shutdown);
        let (conn, sent, _frames) = connection();

        let handle = starter.start(
            conn,
            vec![Symbol::new("ACME")],
            Upstream::Unavailable(ProviderError::UnknownProvider("acme-feed".into())),
        );

        assert!(matches!(handle.join().await, SessionEnd::Upstream(_)));
        assert_eq!(
            sent.events(),
            vec![SessionEvent::error(
                "Provider error: unknown market data provider: acme-feed"
            )]
        );
    }

    #[tokio::test]
    async fn client_disconnect_stops_upstream_and_unregisters() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, registry) = session_starter(&shutdown);
        let (conn, _sent, frames) = connection();

        let provider = Arc::new(ListProvider {
            prices: vec![],
            fail_after: false,
        });
        let handle = starter.start(conn, vec![Symbol::new("ACME")], Upstream::Provider(provider));
        assert_eq!(registry.len(), 1);

        drop(frames);
        let end = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::ClientClosed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_every_session() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, registry) = session_starter(&shutdown);

        let mut handles = Vec::new();
        let mut keep = Vec::new();
        for _ in 0..3 {
            let (conn, _sent, frames) = connection();
            keep.push(frames);
            handles.push(starter.start(conn, vec![], Upstream::None));
        }
        assert_eq!(registry.len(), 3);

        shutdown.cancel();
        for handle in handles {
            assert_eq!(handle.join().await, SessionEnd::Cancelled);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn upstream_ignoring_cancel_is_aborted() {
        let shutdown = CancellationToken::new();
        let config = SessionConfig {
            flush_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let (starter, _eval_rx, registry) = session_starter_with(&shutdown, config);
        let (conn, _sent, _frames) = connection();

        let dropped = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(DeafProvider {
            dropped: Arc::clone(&dropped),
        });
        let handle = starter.start(conn, vec![Symbol::new("ACME")], Upstream::Provider(provider));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!dropped.load(Ordering::SeqCst));

        handle.cancel();
        let end = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn zero_heartbeat_interval_disables_heartbeats() {
        let shutdown = CancellationToken::new();
        let config = SessionConfig {
            heartbeat_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        let (starter, _eval_rx, _registry) = session_starter_with(&shutdown, config);
        let (conn, sent, _frames) = connection();

        let handle = starter.start(conn, vec![], Upstream::None);
        wait_until(|| !sent.events().is_empty()).await;
        assert_eq!(sent.events(), vec![SessionEvent::info(NO_SYMBOLS_MESSAGE)]);
        assert!(!handle.is_finished());

        handle.cancel();
        assert_eq!(handle.join().await, SessionEnd::Cancelled);
        assert!(!sent.0.lock().contains(&SessionEvent::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_hits_idle_timeout() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, _registry) = session_starter(&shutdown);
        let (conn, _sent, _frames) = connection();

        let handle = starter.start(conn, vec![], Upstream::None);
        assert_eq!(handle.join().await, SessionEnd::IdleTimeout);
    }

    struct StuckWriter;

    #[async_trait]
    impl TransportWriter for StuckWriter {
        async fn send(&mut self, _event: &SessionEvent) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_writer_hits_write_timeout() {
        let shutdown = CancellationToken::new();
        let (starter, _eval_rx, registry) = session_starter(&shutdown);
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let conn = Connection::new("stuck", Box::new(StuckWriter), Box::new(ChannelReader(frames_rx)));

        let handle = starter.start(conn, vec![], Upstream::None);
        assert!(matches!(handle.join().await, SessionEnd::Transport(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn first_end_reason_wins() {
        let end = Termination::new(CancellationToken::new());
        end.finish(SessionEnd::IdleTimeout);
        end.finish(SessionEnd::ClientClosed);
        assert_eq!(end.reason(), SessionEnd::IdleTimeout);
        assert!(end.cancel.is_cancelled());
    }
}
