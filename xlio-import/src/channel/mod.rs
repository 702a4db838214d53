//! Progress notification channel
//!
//! One long-lived duplex connection multiplexing progress events for any
//! number of in-flight tasks.
//!
//! DISCONNECTED → CONNECTING → CONNECTED → (DISCONNECTED on drop, reconnect
//! with backoff) → CONNECTING ... → EXHAUSTED (terminal). `close()` moves to
//! CLOSED (terminal) and suppresses reconnects.
//!
//! Each subscriber registers a filter and receives matching events, in wire
//! order, on its own queue. Malformed frames are dropped before any filter
//! runs, so a corrupt message never reaches an unrelated subscriber and
//! never counts against the reconnect budget.

mod backoff;
mod transport;

pub use backoff::ReconnectPolicy;
pub use transport::{Connection, Connector, TransportError, WsConnector};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xlio_common::events::{InboundMessage, ProgressEvent};

use crate::error::{ImportError, ImportResult};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect budget spent
    Exhausted,
    /// Closed on purpose
    Closed,
}

impl ChannelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Exhausted | ChannelState::Closed)
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// Event matching the subscriber's filter
    Event(ProgressEvent),
    /// Channel gave up reconnecting; no further signals follow
    Exhausted,
    /// Channel was closed on purpose; no further signals follow
    Closed,
}

type EventFilter = Box<dyn Fn(&ProgressEvent) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    filter: EventFilter,
    tx: mpsc::UnboundedSender<ChannelSignal>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ChannelState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    connect_attempts: AtomicU64,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Terminal states are sticky
    fn set_state(&self, new_state: ChannelState) {
        self.state_tx.send_if_modified(|state| {
            if state.is_terminal() || *state == new_state {
                false
            } else {
                *state = new_state;
                true
            }
        });
    }

    fn remove_subscriber(&self, id: u64) {
        self.subscribers().retain(|s| s.id != id);
    }

    /// Enter a terminal state, then send a final signal to every subscriber
    /// and drop them all.
    ///
    /// Both happen under the subscriber lock, which `subscribe` also holds
    /// while it checks the state.
    fn terminate(&self, state: ChannelState, signal: ChannelSignal) {
        let mut subscribers = self.subscribers();
        if state == ChannelState::Closed {
            self.state_tx.send_replace(ChannelState::Closed);
        } else {
            self.set_state(state);
        }

        for subscriber in std::mem::take(&mut *subscribers) {
            let _ = subscriber.tx.send(signal.clone());
        }
    }

    fn dispatch(&self, text: &str) {
        let event = match InboundMessage::decode(text) {
            Ok(InboundMessage::Progress(event)) => event,
            Ok(InboundMessage::Ignored { kind, task_id }) => {
                debug!(kind = %kind, task_id = %task_id, "Ignoring non-progress notification");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Dropping malformed notification");
                return;
            }
        };

        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0usize;
        for subscriber in subscribers.iter() {
            if (subscriber.filter)(&event)
                && subscriber.tx.send(ChannelSignal::Event(event.clone())).is_ok()
            {
                delivered += 1;
            }
        }

        debug!(
            task_id = %event.task_id,
            kind = ?event.kind,
            percent = event.percent,
            delivered,
            "Progress notification dispatched"
        );
    }
}

/// Handle to the shared notification channel
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct ProgressChannel {
    shared: Arc<Shared>,
}

impl ProgressChannel {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                state_tx,
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                connect_attempts: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Channel backed by a websocket at `url`
    pub fn websocket(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self::new(Arc::new(WsConnector::new(url)), policy)
    }

    /// Open the channel. No-op if it is already open or connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> ImportResult<()> {
        match self.state() {
            ChannelState::Exhausted => return Err(ImportError::ChannelExhausted),
            ChannelState::Closed => return Err(ImportError::Transport(TransportError::Closed)),
            _ => {}
        }

        let mut driver = self.shared.driver.lock().unwrap_or_else(|e| e.into_inner());
        if driver.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return Ok(());
        }

        info!("Opening notification channel");
        *driver = Some(tokio::spawn(run_driver(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Register a filter; matching events arrive on the returned subscription.
    ///
    /// Subscribing to a channel that is already exhausted or closed yields a
    /// subscription holding only that final signal.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&ProgressEvent) -> bool + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.shared.subscribers();
            match self.state() {
                ChannelState::Exhausted => {
                    let _ = tx.send(ChannelSignal::Exhausted);
                }
                ChannelState::Closed => {
                    let _ = tx.send(ChannelSignal::Closed);
                }
                _ => subscribers.push(Subscriber {
                    id,
                    filter: Box::new(filter),
                    tx,
                }),
            }
        }

        Subscription {
            id,
            rx,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Subscribe to the events of one task
    pub fn subscribe_task(&self, task_id: impl Into<String>) -> Subscription {
        let task_id = task_id.into();
        self.subscribe(move |event| event.task_id == task_id)
    }

    /// Shut down on purpose: no reconnects, subscribers get `Closed`.
    pub async fn close(&self) {
        if self.state() == ChannelState::Closed {
            return;
        }

        info!("Closing notification channel");
        self.shared.terminate(ChannelState::Closed, ChannelSignal::Closed);
        self.shared.shutdown.cancel();

        let handle = self
            .shared
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Notification channel driver ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Observe state changes
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.shared.subscribers();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    /// Total connection attempts made so far (initial + reconnects)
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::Relaxed)
    }
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChannelSignal>,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next signal; `None` after a final signal has been consumed
    pub async fn recv(&mut self) -> Option<ChannelSignal> {
        self.rx.recv().await
    }

    /// Next signal if one is already queued
    pub fn try_recv(&mut self) -> Option<ChannelSignal> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving; equivalent to dropping the subscription
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_subscriber(self.id);
        }
    }
}

enum ReadStep {
    Shutdown,
    Frame(Option<Result<String, TransportError>>),
}

/// Connection loop: connect, read until the connection drops, back off, repeat
async fn run_driver(shared: Arc<Shared>) {
    let policy = shared.policy;
    let mut attempts: u32 = 0;

    loop {
        shared.set_state(ChannelState::Connecting);
        shared.connect_attempts.fetch_add(1, Ordering::Relaxed);

        let connected = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            result = shared.connector.connect() => result,
        };

        match connected {
            Ok(mut connection) => {
                attempts = 0;
                shared.set_state(ChannelState::Connected);
                info!("Notification channel connected");

                loop {
                    let step = tokio::select! {
                        _ = shared.shutdown.cancelled() => ReadStep::Shutdown,
                        frame = connection.next_frame() => ReadStep::Frame(frame),
                    };

                    match step {
                        ReadStep::Shutdown => {
                            connection.close().await;
                            return;
                        }
                        ReadStep::Frame(Some(Ok(text))) => shared.dispatch(&text),
                        ReadStep::Frame(Some(Err(e))) => {
                            warn!(error = %e, "Notification channel connection lost");
                            break;
                        }
                        ReadStep::Frame(None) => {
                            warn!("Notification channel closed by peer");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(attempt = attempts, error = %e, "Notification channel connect failed");
            }
        }

        if shared.shutdown.is_cancelled() {
            return;
        }
        shared.set_state(ChannelState::Disconnected);

        if !policy.allows(attempts) {
            error!(
                attempts,
                "Notification channel reconnect budget exhausted; giving up"
            );
            shared.terminate(ChannelState::Exhausted, ChannelSignal::Exhausted);
            return;
        }

        let delay = policy.delay_for(attempts);
        attempts += 1;
        warn!(
            attempt = attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling notification channel reconnect"
        );

        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
