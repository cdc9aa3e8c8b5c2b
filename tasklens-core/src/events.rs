use crate::background::TaskId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FiltersChanged,
    FilterResultsChanged,
    TaskCompleted,
    ViewportScrolled,
    DataSourceChanged,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::FiltersChanged => "FiltersChanged",
            EventKind::FilterResultsChanged => "FilterResultsChanged",
            EventKind::TaskCompleted => "TaskCompleted",
            EventKind::ViewportScrolled => "ViewportScrolled",
            EventKind::DataSourceChanged => "DataSourceChanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    FiltersChanged { filter_count: usize },
    FilterResultsChanged { result_count: usize },
    TaskCompleted { task_id: TaskId, task_name: String, outcome: TaskOutcome },
    ViewportScrolled { scroll_position: usize },
    DataSourceChanged { version: u64, total_count: usize },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::FiltersChanged { .. } => EventKind::FiltersChanged,
            EngineEvent::FilterResultsChanged { .. } => EventKind::FilterResultsChanged,
            EngineEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            EngineEvent::ViewportScrolled { .. } => EventKind::ViewportScrolled,
            EngineEvent::DataSourceChanged { .. } => EventKind::DataSourceChanged,
        }
    }
}

pub type Handler = Arc<dyn Fn(&EngineEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous publish/subscribe hub. Handlers run on the publishing thread in
/// subscription order; a failing or panicking handler is logged and skipped.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    failures: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    /// total handler failures (errors + panics) since creation
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns how many handlers completed without error.
    pub fn publish(&self, event: &EngineEvent) -> usize {
        let kind = event.kind();
        // snapshot so handlers may subscribe or publish without deadlocking
        let snapshot: Vec<Handler> = match self.handlers.read().get(&kind) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };
        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(event = kind.name(), error = %e, "event handler failed");
                }
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(event = kind.name(), "event handler panicked");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventKind::FiltersChanged, move |_| {
                seen.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(bus.publish(&EngineEvent::FiltersChanged { filter_count: 1 }), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn only_matching_kind_is_invoked() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(EventKind::ViewportScrolled, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish(&EngineEvent::FilterResultsChanged { result_count: 4 });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicU64::new(0));
        bus.subscribe(EventKind::FiltersChanged, |_| anyhow::bail!("boom"));
        bus.subscribe(EventKind::FiltersChanged, |_| panic!("handler panic"));
        let r = Arc::clone(&reached);
        bus.subscribe(EventKind::FiltersChanged, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let delivered = bus.publish(&EngineEvent::FiltersChanged { filter_count: 0 });
        assert_eq!(delivered, 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(bus.failures(), 2);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::FiltersChanged, |_| Ok(()));
        assert_eq!(bus.subscriber_count(EventKind::FiltersChanged), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&EngineEvent::FiltersChanged { filter_count: 0 }), 0);
    }

    #[test]
    fn handler_can_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let got = Arc::new(AtomicU64::new(0));
        let g = Arc::clone(&got);
        bus.subscribe(EventKind::FilterResultsChanged, move |ev| {
            if let EngineEvent::FilterResultsChanged { result_count } = ev {
                g.store(*result_count as u64, Ordering::SeqCst);
            }
            Ok(())
        });
        let inner = Arc::clone(&bus);
        bus.subscribe(EventKind::FiltersChanged, move |_| {
            inner.publish(&EngineEvent::FilterResultsChanged { result_count: 9 });
            Ok(())
        });
        bus.publish(&EngineEvent::FiltersChanged { filter_count: 1 });
        assert_eq!(got.load(Ordering::SeqCst), 9);
    }
}
