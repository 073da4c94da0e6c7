//! Stream sessions.
//!
//! `SessionManager::open_session` spawns one worker per (symbol, interval).
//! The worker starts the connection and the trade snapshot fetch at the same
//! time, then processes connection events strictly in order:
//!
//! - ticker, depth and kline frames are applied as they arrive
//! - trades that arrive before the snapshot settles are held back and
//!   appended after the snapshot
//! - malformed frames are reported and skipped; the connection stays up
//!
//! Every write goes through the session's `EpochGuard`, so once
//! `SessionHandle::close` returns the session never touches the store again.

use crate::config::SessionConfig;
use crate::epoch::EpochGuard;
use crate::error::SessionError;
use crate::report::{ErrorKind, ErrorReporter};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tickflow_core::{FeedKind, Interval, Symbol, Trade, TRADE_WINDOW_CAPACITY};
use tickflow_feed::{CacheStore, DispatchOutcome, FeedDispatcher, FeedKeys, FeedUpdate};
use tickflow_rest::{RestResult, SnapshotLoader};
use tickflow_telemetry::Metrics;
use tickflow_ws::{ConnectionState, StreamSubscription, Transport, TransportContext, WsEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Opens sessions against a shared store.
pub struct SessionManager {
    store: Arc<CacheStore>,
    loader: Arc<dyn SnapshotLoader>,
    reporter: Arc<dyn ErrorReporter>,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        store: Arc<CacheStore>,
        loader: Arc<dyn SnapshotLoader>,
        reporter: Arc<dyn ErrorReporter>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            loader,
            reporter,
            transport,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session. Must be called from within a tokio runtime.
    ///
    /// Each call opens its own connection; use `SessionController` to keep a
    /// single session for a changing subscription.
    pub fn open_session(&self, symbol: Symbol, interval: Interval) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = StreamSubscription::new(symbol.clone(), interval.clone());
        let dispatcher = FeedDispatcher::new(self.store.clone(), symbol, interval);
        let guard = EpochGuard::new();
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let handle = SessionHandle {
            id,
            subscription: subscription.clone(),
            keys: dispatcher.keys().clone(),
            guard: guard.clone(),
            state: state.clone(),
            cancel: cancel.clone(),
            finished: finished.clone(),
            closed: AtomicBool::new(false),
        };

        let worker = SessionWorker {
            id,
            epoch: guard.current(),
            subscription,
            dispatcher,
            guard,
            state,
            reporter: self.reporter.clone(),
            loader: self.loader.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
            cancel,
            finished,
        };
        info!(session = id, subscription = %worker.subscription, "Opening session");
        tokio::spawn(worker.run());

        handle
    }
}

/// Owner's handle to a running session. Dropping it closes the session.
pub struct SessionHandle {
    id: u64,
    subscription: StreamSubscription,
    keys: FeedKeys,
    guard: EpochGuard,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
    finished: CancellationToken,
    closed: AtomicBool,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subscription(&self) -> &StreamSubscription {
        &self.subscription
    }

    /// Store keys this session writes.
    pub fn keys(&self) -> &FeedKeys {
        &self.keys
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn epoch(&self) -> u64 {
        self.guard.current()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the session. Idempotent.
    ///
    /// Waits for a cache write in progress, so no write from this session
    /// happens after it returns. Must not be called from a store subscriber
    /// callback of the same session.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let epoch = self.guard.advance();
        {
            let mut state = self.state.write();
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closing;
            }
        }
        self.cancel.cancel();
        info!(session = self.id, subscription = %self.subscription, epoch, "Session closed");
    }

    /// Resolves once the worker and its connection have stopped.
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }

    /// Close and wait for the connection to be released.
    pub async fn shutdown(&self) {
        self.close();
        self.closed().await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("subscription", &self.subscription)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct SessionWorker {
    id: u64,
    epoch: u64,
    subscription: StreamSubscription,
    dispatcher: FeedDispatcher,
    guard: EpochGuard,
    state: Arc<RwLock<ConnectionState>>,
    reporter: Arc<dyn ErrorReporter>,
    loader: Arc<dyn SnapshotLoader>,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl SessionWorker {
    async fn run(self) {
        let _finished = self.finished.clone().drop_guard();

        let (tx, mut events) = mpsc::channel(self.config.event_buffer.max(1));
        let ctx = TransportContext {
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            events: tx,
            shutdown: self.cancel.clone(),
        };
        let connection = tokio::spawn(self.transport.run(self.subscription.clone(), ctx));
        let mut snapshot = self
            .loader
            .fetch_initial_trades(self.subscription.symbol(), self.config.snapshot_limit);

        let mut seeded = false;
        let mut backlog: VecDeque<Trade> = VecDeque::new();

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                result = &mut snapshot, if !seeded => {
                    seeded = true;
                    self.seed(result, std::mem::take(&mut backlog));
                }

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, seeded, &mut backlog),
                    None => {
                        debug!(session = self.id, "Connection event stream ended");
                        break;
                    }
                },
            }
        }

        // Unblocks a connection waiting on a full channel.
        drop(events);

        match connection.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(session = self.id, error = %e, "Market stream stopped");
                self.report(&SessionError::Connection(e));
            }
            Err(e) => error!(session = self.id, error = %e, "Connection task failed"),
        }

        *self.state.write() = ConnectionState::Closed;
        if self.guard.is_current(self.epoch) {
            Metrics::session_state_set(ConnectionState::Closed.label());
            Metrics::ws_disconnected();
        }
        info!(session = self.id, subscription = %self.subscription, "Session stopped");
    }

    fn handle_event(&self, event: WsEvent, seeded: bool, backlog: &mut VecDeque<Trade>) {
        match event {
            WsEvent::StateChanged(state) => {
                self.guard.run_if_current(self.epoch, || {
                    *self.state.write() = state;
                    Metrics::session_state_set(state.label());
                    if state.is_open() {
                        Metrics::ws_connected();
                    } else {
                        Metrics::ws_disconnected();
                    }
                    debug!(session = self.id, state = %state, "Session state changed");
                });
            }
            WsEvent::Disconnected { cause, reason } => {
                Metrics::ws_reconnect(cause);
                self.guard.run_if_current(self.epoch, || {
                    self.reporter.report_error(ErrorKind::Connection, &reason);
                });
            }
            WsEvent::Frame(text) => self.handle_frame(&text, seeded, backlog),
        }
    }

    fn handle_frame(&self, text: &str, seeded: bool, backlog: &mut VecDeque<Trade>) {
        let started = Instant::now();

        let message = match self.dispatcher.decode(text) {
            Ok(message) => message,
            Err(e) => {
                Metrics::frame_dropped("malformed");
                warn!(session = self.id, error = %e, "Skipping malformed frame");
                self.report(&SessionError::Feed(e));
                return;
            }
        };

        if !seeded
            && message.update.kind() == Some(FeedKind::Trade)
            && self.dispatcher.accepts(&message)
        {
            if let FeedUpdate::Trade(trade) = message.update {
                if backlog.len() == TRADE_WINDOW_CAPACITY {
                    backlog.pop_front();
                }
                backlog.push_back(trade);
            }
            return;
        }

        match self
            .guard
            .run_if_current(self.epoch, || self.dispatcher.apply(message))
        {
            Some(DispatchOutcome::Applied(kind)) => Metrics::frame_applied(kind.label()),
            Some(outcome) => Metrics::frame_dropped(outcome.label()),
            None => {
                Metrics::frame_dropped("stale_epoch");
                debug!(session = self.id, "Dropping frame after close");
            }
        }
        Metrics::frame_processing(started.elapsed().as_secs_f64() * 1_000_000.0);
    }

    fn seed(&self, result: RestResult<Vec<Trade>>, backlog: VecDeque<Trade>) {
        let snapshot = match result {
            Ok(trades) => {
                Metrics::snapshot_fetch("ok");
                info!(session = self.id, count = trades.len(), "Trade snapshot loaded");
                trades
            }
            Err(e) => {
                Metrics::snapshot_fetch("error");
                warn!(session = self.id, error = %e, "Trade snapshot failed, continuing with live trades");
                self.report(&SessionError::SnapshotFetch(e));
                Vec::new()
            }
        };

        self.guard.run_if_current(self.epoch, || {
            self.dispatcher.seed_trades(snapshot, backlog.into());
        });
    }

    fn report(&self, error: &SessionError) {
        let message = error.to_string();
        self.guard.run_if_current(self.epoch, || {
            self.reporter.report_error(error.kind(), &message);
        });
    }
}
