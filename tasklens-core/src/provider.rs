use crate::background::{BackgroundTask, TaskPriority};
use crate::engine::FilterEngine;
use crate::record::Record;
use std::sync::Arc;
use tasklens_common::Result;

/// Supplies full record snapshots to the engine.
pub trait DataProvider<R: Record>: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self) -> Result<Vec<R>>;
}

/// Fixed in-memory snapshot.
pub struct StaticProvider<R> {
    name: String,
    records: Vec<R>,
}

impl<R> StaticProvider<R> {
    pub fn new(name: impl Into<String>, records: Vec<R>) -> Self {
        Self { name: name.into(), records }
    }
}

impl<R: Record + Clone> DataProvider<R> for StaticProvider<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<R>> {
        Ok(self.records.clone())
    }
}

/// Loads `provider` once and installs it as the engine's next version.
pub fn load_into<R: Record>(engine: &FilterEngine<R>, provider: &dyn DataProvider<R>) -> Result<u64> {
    let records = provider.load()?;
    tracing::info!(provider = provider.name(), count = records.len(), "records loaded");
    Ok(engine.resync(records))
}

/// Background task that reloads `provider` off the async threads and resyncs
/// the engine unless cancelled first.
pub fn resync_task<R: Record>(
    engine: Arc<FilterEngine<R>>,
    provider: Arc<dyn DataProvider<R>>,
    priority: TaskPriority,
) -> BackgroundTask {
    let name = format!("resync {}", provider.name());
    BackgroundTask::new(name, priority, move |token| async move {
        let loader = Arc::clone(&provider);
        let records = tokio::task::spawn_blocking(move || loader.load()).await??;
        if token.is_cancelled() {
            anyhow::bail!("resync cancelled before install");
        }
        let count = records.len();
        let version = engine.resync(records);
        Ok(format!("loaded {count} records (v{version})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundProcessor;
    use crate::events::{EngineEvent, EventBus, EventKind, TaskOutcome};
    use crate::record::{Status, Task};
    use parking_lot::Mutex;
    use tasklens_common::TaskLensError;

    struct Broken;

    impl DataProvider<Task> for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn load(&self) -> Result<Vec<Task>> {
            Err(TaskLensError::Other("file vanished".into()))
        }
    }

    fn sample() -> Vec<Task> {
        (1..=3).map(|i| Task::new(i, format!("t{i}"), Status::Pending)).collect()
    }

    #[test]
    fn load_into_bumps_version() {
        let engine = FilterEngine::new(Arc::new(EventBus::new()));
        let provider = StaticProvider::new("static", sample());
        assert_eq!(load_into(&engine, &provider).unwrap(), 1);
        assert_eq!(load_into(&engine, &provider).unwrap(), 2);
        assert_eq!(engine.filtered_results().len(), 3);
        assert!(load_into(&engine, &Broken).is_err());
        assert_eq!(engine.version(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resync_runs_in_background() {
        let bus = Arc::new(EventBus::new());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let o = Arc::clone(&outcomes);
        bus.subscribe(EventKind::TaskCompleted, move |ev| {
            if let EngineEvent::TaskCompleted { outcome, .. } = ev {
                o.lock().push(outcome.clone());
            }
            Ok(())
        });
        let engine = Arc::new(FilterEngine::new(Arc::clone(&bus)));
        let bp = BackgroundProcessor::new(1, Arc::clone(&bus));
        bp.queue_task(resync_task(Arc::clone(&engine), Arc::new(StaticProvider::new("s", sample())), TaskPriority::High));
        bp.queue_task(resync_task(Arc::clone(&engine), Arc::new(Broken), TaskPriority::Low));
        bp.start_processing().unwrap();
        bp.wait_idle().await;
        assert_eq!(engine.data_source().total_count(), 3);
        let outcomes = outcomes.lock();
        assert!(matches!(&outcomes[0], TaskOutcome::Completed(m) if m.contains("3 records")));
        assert!(matches!(&outcomes[1], TaskOutcome::Failed(m) if m.contains("file vanished")));
    }
}
