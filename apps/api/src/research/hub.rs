//! Progress stream hub: one in-memory event queue per application,
//! drained by a single Server-Sent-Event subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::models::research::ResearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Searching,
    Found,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        category: String,
        status: CategoryStatus,
        message: String,
    },
    Complete {
        results: ResearchResult,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl ProgressEvent {
    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

/// What the subscriber loop yields: a data event or an idle keepalive.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(ProgressEvent),
    KeepAlive,
}

struct Queue {
    generation: u64,
    /// Set once any event has been sent.
    published: bool,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<ProgressEvent>>>,
}

pub struct ProgressHub {
    queues: Arc<DashMap<Uuid, Queue>>,
    idle_timeout: Duration,
    next_generation: AtomicU64,
}

impl ProgressHub {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            idle_timeout,
            next_generation: AtomicU64::new(1),
        }
    }

    fn new_queue(&self) -> Queue {
        let (tx, rx) = mpsc::unbounded_channel();
        Queue {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            published: false,
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Gives a new run a clean queue. Events left over from an earlier run are
    /// discarded; an untouched queue (a subscriber that connected early) is kept.
    pub fn open(&self, application_id: Uuid) {
        match self.queues.entry(application_id) {
            Entry::Occupied(entry) if !entry.get().published => {}
            Entry::Occupied(mut entry) => {
                debug!(application_id = %application_id, "Replacing stale progress queue");
                entry.insert(self.new_queue());
            }
            Entry::Vacant(entry) => {
                entry.insert(self.new_queue());
            }
        }
    }

    /// Silently drops the event when nobody has opened a queue for the application.
    pub fn publish(&self, application_id: Uuid, event: ProgressEvent) {
        match self.queues.get_mut(&application_id) {
            Some(mut queue) => {
                queue.published = true;
                let _ = queue.tx.send(event);
            }
            None => debug!(application_id = %application_id, "No progress queue; event dropped"),
        }
    }

    /// Drops the queue. A live subscriber still drains what was already sent.
    pub fn close(&self, application_id: Uuid) {
        self.queues.remove(&application_id);
    }

    pub fn is_open(&self, application_id: Uuid) -> bool {
        self.queues.contains_key(&application_id)
    }

    /// Long-lived pull loop over the application's queue. Waits up to the idle
    /// timeout per event, yielding a keepalive on timeout. Ends after a terminal
    /// event or when the queue is closed. Dropping the stream releases the queue.
    pub fn subscribe(&self, application_id: Uuid) -> impl Stream<Item = StreamFrame> + Send + 'static {
        let (generation, rx) = {
            let queue = self
                .queues
                .entry(application_id)
                .or_insert_with(|| self.new_queue());
            (queue.generation, queue.rx.clone())
        };
        let guard = QueueRelease {
            queues: self.queues.clone(),
            application_id,
            generation,
        };
        let idle_timeout = self.idle_timeout;

        stream! {
            let _guard = guard;
            // Another subscriber may hold the queue; keep this one alive meanwhile.
            let mut rx = loop {
                match tokio::time::timeout(idle_timeout, rx.clone().lock_owned()).await {
                    Ok(rx) => break rx,
                    Err(_) => yield StreamFrame::KeepAlive,
                }
            };
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        yield StreamFrame::Event(event);
                        if terminal {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => yield StreamFrame::KeepAlive,
                }
            }
        }
    }
}

/// Removes the subscriber's queue on teardown, unless it has since been replaced.
struct QueueRelease {
    queues: Arc<DashMap<Uuid, Queue>>,
    application_id: Uuid,
    generation: u64,
}

impl Drop for QueueRelease {
    fn drop(&mut self) {
        self.queues
            .remove_if(&self.application_id, |_, q| q.generation == self.generation);
    }
}
