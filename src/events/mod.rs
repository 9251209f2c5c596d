//! Publish/subscribe event bus for progress and completion reporting.
//!
//! Components never hold a global bus. They receive an [`EventSink`]
//! (usually an [`EventBus`]) at construction and emit typed [`Event`]s through
//! it; tests substitute a recording sink.
//!
//! # Semantics
//!
//! - Each [`EventKind`] retains its most recent payload.
//! - A subscription created with `immediate: true` is replayed that payload
//!   on a spawned task, so `subscribe` never runs the handler inline while a
//!   runtime is available.
//! - `once` subscriptions remove themselves after the first invocation,
//!   including a replay invocation.
//! - A handler that fails (returns `Err` or panics) is logged; the other
//!   handlers of the same emission still run.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::BookStatus;
use crate::orchestrator::{BookStage, OrchestratorState};
use crate::queue::QueueStatus;

/// Event names used for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    StateChanged,
    ScanProgress,
    ScanCompleted,
    ScanFailed,
    BooksGrouped,
    BookStage,
    BookCompleted,
    BatchCompleted,
    BatchFailed,
    QueueStatus,
}

/// An event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    StateChanged {
        state: OrchestratorState,
    },
    ScanProgress {
        root: PathBuf,
        files_found: usize,
        entries_seen: usize,
    },
    ScanCompleted {
        root: PathBuf,
        files_found: usize,
        skipped_dirs: usize,
        elapsed_ms: u64,
    },
    ScanFailed {
        root: PathBuf,
        error: String,
    },
    BooksGrouped {
        books: usize,
        files: usize,
    },
    BookStage {
        book: String,
        stage: BookStage,
    },
    BookCompleted {
        book: String,
        status: BookStatus,
        error: Option<String>,
    },
    BatchCompleted {
        processed: usize,
        metadata_only: usize,
        failed: usize,
        skipped: usize,
    },
    BatchFailed {
        error: String,
    },
    QueueStatus {
        queue: String,
        status: QueueStatus,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StateChanged { .. } => EventKind::StateChanged,
            Event::ScanProgress { .. } => EventKind::ScanProgress,
            Event::ScanCompleted { .. } => EventKind::ScanCompleted,
            Event::ScanFailed { .. } => EventKind::ScanFailed,
            Event::BooksGrouped { .. } => EventKind::BooksGrouped,
            Event::BookStage { .. } => EventKind::BookStage,
            Event::BookCompleted { .. } => EventKind::BookCompleted,
            Event::BatchCompleted { .. } => EventKind::BatchCompleted,
            Event::BatchFailed { .. } => EventKind::BatchFailed,
            Event::QueueStatus { .. } => EventKind::QueueStatus,
        }
    }
}

/// Anything that accepts events.
///
/// Returns the number of handlers that received the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event) -> usize;
}

/// Handler signature. Errors are logged by the bus, never propagated.
pub type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Opaque subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Options for [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Remove the subscription after its first invocation
    pub once: bool,
    /// Replay the last payload of this kind, if any
    pub immediate: bool,
}

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
    once: bool,
    fired: AtomicBool,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Arc<Subscription>>,
    last_events: HashMap<EventKind, Event>,
    next_id: u64,
}

/// In-process event bus with last-value replay.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`.
    pub fn subscribe<F>(
        &self,
        kind: EventKind,
        handler: F,
        options: SubscribeOptions,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let (subscription, replay) = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let subscription = Arc::new(Subscription {
                id: SubscriptionId(state.next_id),
                kind,
                handler: Arc::new(handler),
                once: options.once,
                fired: AtomicBool::new(false),
            });
            state.subscriptions.push(Arc::clone(&subscription));
            let replay = if options.immediate {
                state.last_events.get(&kind).cloned()
            } else {
                None
            };
            (subscription, replay)
        };

        let id = subscription.id;
        if let Some(event) = replay {
            let bus = self.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        bus.dispatch(&subscription, &event);
                    });
                }
                Err(_) => {
                    tracing::debug!(target: "events", ?kind, "No runtime, replaying inline");
                    bus.dispatch(&subscription, &event);
                }
            }
        }
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.subscriptions.len() != before
    }

    /// Most recent payload emitted for `kind`.
    pub fn last_event(&self, kind: EventKind) -> Option<Event> {
        self.state.lock().last_events.get(&kind).cloned()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.state
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    fn is_registered(&self, id: SubscriptionId) -> bool {
        self.state.lock().subscriptions.iter().any(|s| s.id == id)
    }

    /// Invoke one subscription. Returns true if the handler ran.
    fn dispatch(&self, subscription: &Subscription, event: &Event) -> bool {
        if !self.is_registered(subscription.id) {
            return false;
        }
        if subscription.once {
            if subscription.fired.swap(true, Ordering::SeqCst) {
                return false;
            }
            self.unsubscribe(subscription.id);
        }

        let kind = subscription.kind;
        match catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(target: "events", ?kind, error = %e, "Event handler failed");
            }
            Err(_) => {
                tracing::warn!(target: "events", ?kind, "Event handler panicked");
            }
        }
        true
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) -> usize {
        let kind = event.kind();
        let subscribers: Vec<Arc<Subscription>> = {
            let mut state = self.state.lock();
            state.last_events.insert(kind, event.clone());
            state
                .subscriptions
                .iter()
                .filter(|s| s.kind == kind)
                .cloned()
                .collect()
        };

        subscribers
            .iter()
            .filter(|s| self.dispatch(s, &event))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn grouped(books: usize) -> Event {
        Event::BooksGrouped { books, files: books }
    }

    fn counter() -> (
        Arc<AtomicUsize>,
        impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &Event| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_emit_reaches_matching_subscribers_only() {
        let bus = EventBus::new();
        let (grouped_count, handler) = counter();
        bus.subscribe(EventKind::BooksGrouped, handler, SubscribeOptions::default());
        let (failed_count, handler) = counter();
        bus.subscribe(EventKind::BatchFailed, handler, SubscribeOptions::default());

        assert_eq!(bus.emit(grouped(2)), 1);
        assert_eq!(grouped_count.load(Ordering::SeqCst), 1);
        assert_eq!(failed_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (count, handler) = counter();
        let id = bus.subscribe(EventKind::BooksGrouped, handler, SubscribeOptions::default());

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.emit(grouped(1)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_once_removes_after_first_invocation() {
        let bus = EventBus::new();
        let (count, handler) = counter();
        bus.subscribe(
            EventKind::BooksGrouped,
            handler,
            SubscribeOptions {
                once: true,
                immediate: false,
            },
        );

        bus.emit(grouped(1));
        bus.emit(grouped(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::BooksGrouped), 0);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe(
            EventKind::BooksGrouped,
            |_| anyhow::bail!("handler exploded"),
            SubscribeOptions::default(),
        );
        bus.subscribe(
            EventKind::BooksGrouped,
            |_| panic!("handler panicked"),
            SubscribeOptions::default(),
        );
        let (count, handler) = counter();
        bus.subscribe(EventKind::BooksGrouped, handler, SubscribeOptions::default());

        assert_eq!(bus.emit(grouped(1)), 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Bus is still usable afterwards
        assert_eq!(bus.emit(grouped(2)), 3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(bus.last_event(EventKind::BooksGrouped), Some(grouped(2)));
    }

    #[tokio::test]
    async fn test_immediate_replays_last_payload_asynchronously() {
        let bus = EventBus::new();
        bus.emit(grouped(7));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            EventKind::BooksGrouped,
            move |event| {
                tx.send(event.clone())?;
                Ok(())
            },
            SubscribeOptions {
                once: false,
                immediate: true,
            },
        );

        // Not delivered during subscribe on a current-thread runtime
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await, Some(grouped(7)));
    }

    #[tokio::test]
    async fn test_immediate_without_history_does_nothing() {
        let bus = EventBus::new();
        let (count, handler) = counter();
        bus.subscribe(
            EventKind::ScanFailed,
            handler,
            SubscribeOptions {
                once: false,
                immediate: true,
            },
        );
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_once_with_immediate_counts_replay() {
        let bus = EventBus::new();
        bus.emit(grouped(1));

        let (count, handler) = counter();
        bus.subscribe(
            EventKind::BooksGrouped,
            handler,
            SubscribeOptions {
                once: true,
                immediate: true,
            },
        );
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.emit(grouped(2)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
