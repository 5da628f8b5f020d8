//! # engram-channel
//!
//! The pub/sub channel that keeps a group's working memories in
//! lock-step. Publishes `added`/`evicted`/`cleared` events as JSON rows
//! on a channel named after the group; a listener thread polls for new
//! rows (bounded 0.5 s poll so stop is responsive) and fans each event
//! out to every registered callback.
//!
//! Delivery is at-most-once and best-effort with no ordering across
//! publishers. Consumers reconcile against the database: the edge's
//! `in_working_memory` flag is the source of truth.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use engram_core::constants::{CHANNEL_POLL_INTERVAL_MS, NOTIFY_PAYLOAD_LIMIT};
use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::{WmEvent, WmEventKind};
use engram_storage::StorageEngine;

type Callback = Box<dyn Fn(&WmEvent) + Send + Sync>;

/// A registered callback's handle (kept so callers can identify their
/// registration in logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(Uuid);

struct Listener {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

pub struct WmChannel {
    engine: Arc<StorageEngine>,
    channel_name: String,
    callbacks: Arc<Mutex<Vec<(SubscriptionId, Callback)>>>,
    listener: Mutex<Option<Listener>>,
    received: Arc<AtomicU64>,
}

impl WmChannel {
    pub fn new(engine: Arc<StorageEngine>, group_name: &str) -> Self {
        Self {
            engine,
            channel_name: derive_channel_name(group_name),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            listener: Mutex::new(None),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deterministic channel name: `htm_wm_<group>` with every
    /// non-alphanumeric replaced by `_`.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Publish one event. Payloads above the notify limit are rejected
    /// locally before anything reaches the server.
    pub fn notify(
        &self,
        event: WmEventKind,
        node_id: Option<i64>,
        robot_id: i64,
    ) -> EngramResult<()> {
        let payload = serde_json::to_string(&WmEvent::new(event, node_id, robot_id))
            .map_err(|e| EngramError::InvalidInput(format!("serialise event: {e}")))?;
        if payload.len() > NOTIFY_PAYLOAD_LIMIT {
            return Err(EngramError::InvalidInput(format!(
                "notify payload of {} bytes exceeds the {NOTIFY_PAYLOAD_LIMIT} byte limit",
                payload.len()
            )));
        }
        self.engine.publish_event(&self.channel_name, &payload)?;
        Ok(())
    }

    /// Register a callback. Multiple callbacks fan out; each sees every
    /// event, synchronously on the listener thread.
    pub fn on_change(&self, callback: impl Fn(&WmEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.callbacks
            .lock()
            .unwrap()
            .push((id, Box::new(callback)));
        id
    }

    /// Start the listener thread. Only events published after this point
    /// are delivered. Idempotent while running.
    pub fn start(&self) -> EngramResult<()> {
        let mut guard = self.listener.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let engine = Arc::clone(&self.engine);
        let channel = self.channel_name.clone();
        let callbacks = Arc::clone(&self.callbacks);
        let received = Arc::clone(&self.received);
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name(format!("engram-listen-{channel}"))
            .spawn(move || {
                let mut last_id = match engine.latest_event_id(&channel) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!(channel = %channel, error = %e, "listener failed to initialise");
                        return;
                    }
                };

                while !stop_flag.load(Ordering::SeqCst) {
                    match engine.events_after(&channel, last_id) {
                        Ok(events) => {
                            for (event_id, payload) in events {
                                last_id = event_id;
                                received.fetch_add(1, Ordering::Relaxed);
                                dispatch(&callbacks, &channel, &payload);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "listener poll failed");
                        }
                    }
                    std::thread::sleep(Duration::from_millis(CHANNEL_POLL_INTERVAL_MS));
                }
            })
            .map_err(|e| EngramError::DatabaseError(format!("spawn listener: {e}")))?;

        *guard = Some(Listener { handle, stop });
        tracing::debug!(channel = %self.channel_name, "channel listener started");
        Ok(())
    }

    /// Stop the listener. Returns within one poll period.
    pub fn stop(&self) {
        let listener = self.listener.lock().unwrap().take();
        if let Some(listener) = listener {
            listener.stop.store(true, Ordering::SeqCst);
            let _ = listener.handle.join();
            tracing::debug!(channel = %self.channel_name, "channel listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    /// Notifications handled by this listener since start.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Drop for WmChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parse and fan a payload out to every callback. A malformed payload or
/// a panicking callback is logged and never crashes the listener.
fn dispatch(callbacks: &Mutex<Vec<(SubscriptionId, Callback)>>, channel: &str, payload: &str) {
    let event: WmEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(channel = %channel, error = %e, "ignoring malformed channel payload");
            return;
        }
    };

    let guard = callbacks.lock().unwrap();
    for (id, callback) in guard.iter() {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
        if result.is_err() {
            tracing::error!(
                channel,
                subscription = ?id,
                event = ?event.event,
                "channel callback panicked"
            );
        }
    }
}

/// `htm_wm_<group>` with non-alphanumerics replaced by `_`.
pub fn derive_channel_name(group_name: &str) -> String {
    let sanitised: String = group_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("htm_wm_{sanitised}")
}
