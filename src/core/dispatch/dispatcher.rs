//! Function-call dispatcher.
//!
//! Watches the event log for function calls and forwards each distinct call
//! to the relay at most once. Relay calls are fire-and-forget: they run as
//! detached tasks and their outcome lands in the [`DispatchStore`] and, when
//! configured, on a [`DispatchNotice`] channel.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::key::idempotency_key;
use super::store::{DispatchOutcome, DispatchRecord, DispatchStore};
use super::SEND_MESSAGE_FUNCTION;
use crate::core::events::LoggedEvent;
use crate::core::relay::{RelayClient, RelayResponse};

/// Argument of `send_message` carrying the command text.
pub const MESSAGE_ARG: &str = "message";

/// Settled outcome of one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchNotice {
    /// Idempotency key of the record
    pub key: String,
    /// Function name
    pub name: String,
    /// Upstream call id, if any
    pub call_id: Option<String>,
    /// Final outcome (never `Pending`)
    pub outcome: DispatchOutcome,
    /// Relay message or failure description
    pub message: String,
}

/// Result of one scan over the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Calls seen for the first time and sent to the relay
    pub dispatched: usize,
    /// Calls whose key was already known
    pub suppressed: usize,
}

/// At-most-once dispatcher of function calls to a relay.
pub struct Dispatcher {
    relay: Arc<dyn RelayClient>,
    /// Store of the current session
    store: Mutex<DispatchStore>,
    tracker: TaskTracker,
    /// Next log position to examine
    cursor: Mutex<u64>,
    suppressed_total: AtomicU64,
    notices: Option<mpsc::UnboundedSender<DispatchNotice>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store())
            .field("pending", &self.pending())
            .field("floor", &self.floor())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher writing to `store`.
    pub fn new(relay: Arc<dyn RelayClient>, store: DispatchStore) -> Self {
        Self {
            relay,
            store: Mutex::new(store),
            tracker: TaskTracker::new(),
            cursor: Mutex::new(0),
            suppressed_total: AtomicU64::new(0),
            notices: None,
        }
    }

    /// Publish every settled outcome on `tx`.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<DispatchNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Record store of the current session.
    pub fn store(&self) -> DispatchStore {
        self.store.lock().clone()
    }

    /// Swap in a fresh store and ignore log positions below `floor`.
    ///
    /// Returns the previous store. Relay calls still in flight keep a handle
    /// to it, so their outcomes settle there.
    pub fn begin_session(&self, floor: u64) -> DispatchStore {
        let mut cursor = self.cursor.lock();
        *cursor = floor;
        std::mem::take(&mut *self.store.lock())
    }

    /// Ignore log positions below `seq` from now on.
    pub fn set_floor(&self, seq: u64) {
        *self.cursor.lock() = seq;
    }

    /// Next log position a scan will examine.
    pub fn floor(&self) -> u64 {
        *self.cursor.lock()
    }

    /// Relay calls still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Total duplicate calls suppressed since creation.
    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total.load(Ordering::Relaxed)
    }

    /// Wait until every in-flight relay call has settled.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Dispatch every function call in `events` not seen before.
    ///
    /// Each log position is examined once: events below the cursor are
    /// skipped and the cursor moves past the last event scanned. A call is
    /// suppressed only when its key is already in the store. Must run inside
    /// a tokio runtime.
    pub fn scan(&self, events: &[LoggedEvent]) -> ScanReport {
        let mut cursor = self.cursor.lock();
        let store = self.store();
        let mut report = ScanReport::default();

        for logged in events.iter().filter(|e| e.seq >= *cursor) {
            for (part, call) in logged.event.function_call_parts() {
                let key = idempotency_key(&call.name, &call.args, logged.at);
                let record = DispatchRecord {
                    key: key.clone(),
                    seq: logged.seq,
                    part,
                    name: call.name.clone(),
                    args: call.args.clone(),
                    call_id: call.call_id.clone(),
                    dispatched_at: OffsetDateTime::now_utc(),
                    completed_at: None,
                    outcome: DispatchOutcome::Pending,
                    message: None,
                };

                if !store.insert_pending(record) {
                    trace!(key = %key, name = %call.name, "Duplicate function call suppressed");
                    report.suppressed += 1;
                    continue;
                }

                info!(name = %call.name, seq = logged.seq, "Dispatching function call");
                self.spawn_relay_call(
                    store.clone(),
                    key,
                    call.name.clone(),
                    call.args.clone(),
                    call.call_id.clone(),
                );
                report.dispatched += 1;
            }
        }

        if let Some(last) = events.last() {
            *cursor = (*cursor).max(last.seq + 1);
        }
        if report.suppressed > 0 {
            self.suppressed_total
                .fetch_add(report.suppressed as u64, Ordering::Relaxed);
        }
        report
    }

    fn spawn_relay_call(
        &self,
        store: DispatchStore,
        key: String,
        name: String,
        args: BTreeMap<String, String>,
        call_id: Option<String>,
    ) {
        let relay = self.relay.clone();
        let notices = self.notices.clone();

        self.tracker.spawn(async move {
            let call = relay_call(relay.as_ref(), &name, &args);
            let response = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(response) => response,
                Err(_) => RelayResponse::failed("relay call panicked"),
            };

            let outcome = if response.success {
                debug!(name = %name, "Relay accepted function call");
                DispatchOutcome::Sent
            } else {
                warn!(name = %name, message = %response.message, "Function call dispatch failed");
                DispatchOutcome::Failed
            };

            let message = (!response.message.is_empty()).then(|| response.message.clone());
            if !store.set_outcome(&key, outcome, message) {
                // Store was cleared while the call was in flight.
                debug!(key = %key, "Dropping outcome for unknown record");
                return;
            }

            if let Some(tx) = notices {
                let _ = tx.send(DispatchNotice {
                    key,
                    name,
                    call_id,
                    outcome,
                    message: response.message,
                });
            }
        });
    }
}

async fn relay_call(
    relay: &dyn RelayClient,
    name: &str,
    args: &BTreeMap<String, String>,
) -> RelayResponse {
    if name == SEND_MESSAGE_FUNCTION {
        let text = args.get(MESSAGE_ARG).map(String::as_str).unwrap_or_default();
        relay.dispatch_message(text).await
    } else {
        relay.dispatch_action(name, args).await
    }
}
