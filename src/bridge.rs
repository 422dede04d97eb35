//! Session event bridge.
//!
//! Wires a session client to the event log, the function-call dispatcher and
//! a state channel for presentation:
//!
//! ```text
//! session events -> EventLog -> Dispatcher::scan -> relay (detached)
//!                            \-> compose -> BridgeState (watch)
//! ```
//!
//! The log is appended to only from the session's event callback. Every
//! append triggers a scan and republishes the derived conversation; relay
//! outcomes republish as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::dispatch::{
    DispatchNotice, DispatchOutcome, DispatchRecord, DispatchStore, Dispatcher,
};
use crate::core::events::{EventLog, RawEvent};
use crate::core::relay::RelayClient;
use crate::core::session::{BoxedSession, SessionInput, SessionResult};
use crate::core::transcript::{ConversationEntry, compose};

/// Snapshot published to presentation layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BridgeState {
    /// Whether the session is open
    pub connected: bool,
    /// Derived conversation
    pub conversation: Vec<ConversationEntry>,
}

struct BridgeInner {
    log: EventLog,
    dispatcher: Dispatcher,
    /// Stores of earlier sessions. Late relay outcomes still settle here.
    archived: SyncMutex<Vec<DispatchStore>>,
    connected: AtomicBool,
    state_tx: watch::Sender<BridgeState>,
}

impl BridgeInner {
    fn records(&self) -> Vec<DispatchRecord> {
        let mut records: Vec<DispatchRecord> = self
            .archived
            .lock()
            .iter()
            .flat_map(|store| store.records())
            .collect();
        records.extend(self.dispatcher.store().records());
        records
    }

    fn conversation(&self) -> Vec<ConversationEntry> {
        self.log.read(|events| compose(events, &self.records()))
    }

    fn publish(&self) {
        let state = BridgeState {
            connected: self.connected.load(Ordering::SeqCst),
            conversation: self.conversation(),
        };
        self.state_tx.send_replace(state);
    }

    fn handle_event(&self, event: RawEvent) {
        let seq = self.log.append(event);
        let report = self.log.read(|events| {
            let from = self.dispatcher.floor() as usize;
            self.dispatcher.scan(events.get(from..).unwrap_or_default())
        });
        if report.dispatched > 0 {
            debug!(seq, dispatched = report.dispatched, "Function calls dispatched");
        }
        self.publish();
    }

    fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            info!(connected, "Session connection changed");
            self.publish();
        }
    }
}

/// Bridge between one session client and the relay.
pub struct SessionBridge {
    session: Arc<Mutex<BoxedSession>>,
    inner: Arc<BridgeInner>,
    notices: SyncMutex<Option<mpsc::UnboundedReceiver<DispatchNotice>>>,
    notice_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("log", &self.inner.log)
            .field("dispatcher", &self.inner.dispatcher)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        if let Some(task) = self.notice_task.lock().take() {
            task.abort();
        }
    }
}

impl SessionBridge {
    /// Create a bridge with a fresh log and dispatch store.
    pub fn new(session: BoxedSession, relay: Arc<dyn RelayClient>) -> Self {
        Self::with_parts(session, relay, EventLog::new(), DispatchStore::new())
    }

    /// Create a bridge over an existing log and store.
    pub fn with_parts(
        session: BoxedSession,
        relay: Arc<dyn RelayClient>,
        log: EventLog,
        store: DispatchStore,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(relay, store).with_notices(notice_tx);
        let (state_tx, _) = watch::channel(BridgeState::default());

        let inner = Arc::new(BridgeInner {
            log,
            dispatcher,
            archived: SyncMutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            state_tx,
        });
        inner.publish();

        Self {
            session: Arc::new(Mutex::new(session)),
            inner,
            notices: SyncMutex::new(Some(notice_rx)),
            notice_task: SyncMutex::new(None),
        }
    }

    /// Start a new logical session.
    ///
    /// Archives the dispatch store of the previous session and makes sure
    /// calls already in the log are never dispatched again. Relay calls of
    /// the previous session are not awaited; their outcomes settle in the
    /// archived store.
    pub async fn start(&self) -> SessionResult<()> {
        self.spawn_notice_task();

        let mut session = self.session.lock().await;
        if session.is_ready() {
            return Ok(());
        }

        let previous = self
            .inner
            .dispatcher
            .begin_session(self.inner.log.len() as u64);
        if !previous.is_empty() {
            self.inner.archived.lock().push(previous);
        }

        let inner = self.inner.clone();
        session.on_event(Arc::new(move |event| {
            let inner = inner.clone();
            Box::pin(async move {
                inner.handle_event(event);
            })
        }))?;

        let inner = self.inner.clone();
        session.on_connection_change(Arc::new(move |connected| {
            let inner = inner.clone();
            Box::pin(async move {
                inner.set_connected(connected);
            })
        }))?;

        session.on_error(Arc::new(|error| {
            Box::pin(async move {
                warn!("Session error: {}", error);
            })
        }))?;

        session.connect().await?;
        self.inner.set_connected(session.is_ready());
        Ok(())
    }

    /// Close the session. In-flight relay calls keep running.
    pub async fn stop(&self) -> SessionResult<()> {
        let result = self.session.lock().await.disconnect().await;
        self.inner.set_connected(false);
        result
    }

    /// Send user input into the open session.
    pub async fn send(&self, input: SessionInput) -> SessionResult<()> {
        self.session.lock().await.send(input).await
    }

    /// Send a complete text turn.
    pub async fn send_text(&self, text: &str) -> SessionResult<()> {
        self.send(SessionInput::text(text)).await
    }

    /// Send an audio chunk.
    pub async fn send_audio(&self, data: Bytes, mime_type: &str) -> SessionResult<()> {
        self.send(SessionInput::audio(data, mime_type)).await
    }

    /// Whether the session is open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The event log.
    pub fn log(&self) -> &EventLog {
        &self.inner.log
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Current derived conversation.
    pub fn conversation(&self) -> Vec<ConversationEntry> {
        self.inner.conversation()
    }

    /// All dispatch records, earlier sessions first.
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.inner.records()
    }

    /// Latest published state.
    pub fn state(&self) -> BridgeState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch published state.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait for in-flight relay calls and their follow-up to finish.
    pub async fn wait_for_dispatches(&self) {
        self.inner.dispatcher.wait_idle().await;
        // Let the notice task drain what the relay tasks just sent.
        tokio::task::yield_now().await;
    }

    fn spawn_notice_task(&self) {
        let Some(mut rx) = self.notices.lock().take() else {
            return;
        };
        let inner = self.inner.clone();
        let session = self.session.clone();

        let task = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                inner.publish();

                let Some(call_id) = notice.call_id.as_deref() else {
                    continue;
                };
                if !inner.dispatcher.store().contains(&notice.key) {
                    debug!(name = %notice.name, "Call belongs to an earlier session, dropping tool response");
                    continue;
                }
                let mut session = session.lock().await;
                if !session.is_ready() {
                    debug!(name = %notice.name, "Session closed, dropping tool response");
                    continue;
                }

                let response = serde_json::json!({
                    "status": notice.outcome,
                    "success": notice.outcome == DispatchOutcome::Sent,
                    "message": notice.message,
                });
                if let Err(e) = session
                    .send_tool_response(call_id, &notice.name, response)
                    .await
                {
                    warn!(name = %notice.name, "Failed to send tool response: {}", e);
                }
            }
        });
        *self.notice_task.lock() = Some(task);
    }
}
