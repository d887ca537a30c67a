//! ==============================================================================
//! stream.rs - per-client snapshot streaming
//! ==============================================================================
//!
//! purpose:
//!     every connected client gets its own task that sends one full snapshot
//!     immediately, then another full snapshot on a fixed cadence, until the
//!     client goes away.
//!
//! lifecycle (one task per client):
//!
//! ```text
//!     CONNECTING ──(initial_data sent)──> STREAMING ──(receiver dropped
//!         │                                   │         or send failed)──> CLOSED
//!         └──────────(send failed)────────────┴──────────────────────────────┘
//! ```
//!
//! the task owns its ticker, so leaving the loop drops the timer with it.
//! a slow client only fills its own bounded channel; the store is read with
//! `list()` and never held while sending.
//!
//! relationships:
//!     - used by: api.rs (wraps the receiver as server-sent events)
//!     - reads: store.rs
//!
//! ==============================================================================

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::Reading;
use crate::store::SensorStore;

/// one sensor as sent to stream clients and list callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    pub id: String,
    #[serde(flatten)]
    pub reading: Reading,
    pub status: &'static str,
    pub last_update: DateTime<Utc>,
}

impl From<Reading> for SensorView {
    fn from(reading: Reading) -> Self {
        Self {
            id: reading.sensor_id.clone(),
            last_update: reading.timestamp,
            status: "active",
            reading,
        }
    }
}

pub fn views(readings: Vec<Reading>) -> Vec<SensorView> {
    readings.into_iter().map(SensorView::from).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    InitialData {
        sensors: Vec<SensorView>,
    },
    SensorUpdate {
        sensors: Vec<SensorView>,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Streaming,
    Closed,
}

/// counts live client tasks; decremented however the task ends
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct StreamGateway {
    store: SensorStore,
    cadence: Duration,
    buffer: usize,
    active: Arc<AtomicUsize>,
    next_client: Arc<AtomicU64>,
}

impl StreamGateway {
    pub fn new(store: SensorStore, cadence: Duration, buffer: usize) -> Self {
        Self {
            store,
            cadence,
            buffer: buffer.max(1),
            active: Arc::new(AtomicUsize::new(0)),
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }

    /// number of client tasks still running
    pub fn active_clients(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// start streaming to a new client. dropping the returned stream closes it.
    pub fn connect(&self) -> ReceiverStream<StreamMessage> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let client = Client {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            store: self.store.clone(),
            cadence: self.cadence,
            phase: Phase::Connecting,
            _active: ActiveGuard::new(self.active.clone()),
        };
        tokio::spawn(client.run(tx));
        ReceiverStream::new(rx)
    }
}

struct Client {
    id: u64,
    store: SensorStore,
    cadence: Duration,
    phase: Phase,
    _active: ActiveGuard,
}

impl Client {
    async fn run(mut self, tx: mpsc::Sender<StreamMessage>) {
        tracing::debug!(client = self.id, "stream client connecting");

        let initial = StreamMessage::InitialData {
            sensors: views(self.store.list()),
        };
        if tx.send(initial).await.is_ok() {
            self.transition(Phase::Streaming);
            self.stream(&tx).await;
        }

        self.transition(Phase::Closed);
    }

    async fn stream(&self, tx: &mpsc::Sender<StreamMessage>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.cadence, self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.closed() => return,
                _ = ticker.tick() => {
                    let update = StreamMessage::SensorUpdate {
                        sensors: views(self.store.list()),
                        timestamp: Utc::now(),
                    };
                    if tx.send(update).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(client = self.id, from = ?self.phase, to = ?next, "stream client");
        self.phase = next;
    }
}
