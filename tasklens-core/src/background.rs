use crate::events::{EngineEvent, EventBus, TaskOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tasklens_common::{BackgroundConfig, Result, TaskLensError};
use tokio::runtime::Handle;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Finished tasks remembered for `task_state` and `snapshot`.
pub const HISTORY_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// declaration order is scheduling order: High > Normal > Low
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        }
    }
}

type Action = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<String>> + Send>;

/// A unit of background work. The action receives a token it should poll
/// (`is_cancelled()` / `cancelled().await`) to stop early.
pub struct BackgroundTask {
    name: String,
    priority: TaskPriority,
    action: Action,
}

impl BackgroundTask {
    pub fn new<F, Fut>(name: impl Into<String>, priority: TaskPriority, action: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            action: Box::new(move |token| action(token).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub success: bool,
    pub reason: String,
}

impl CancelOutcome {
    fn ok(reason: &str) -> Self {
        Self { success: true, reason: reason.to_string() }
    }

    fn refused(reason: impl Into<String>) -> Self {
        Self { success: false, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub priority: TaskPriority,
    pub state: TaskState,
}

// heap entry: highest priority first, then lowest sequence number
#[derive(PartialEq, Eq)]
struct QueueEntry {
    priority: TaskPriority,
    seq: u64,
    id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct TaskRecord {
    name: String,
    priority: TaskPriority,
    state: TaskState,
    token: CancellationToken,
    action: Option<Action>,
}

#[derive(Default)]
struct Schedule {
    // cancelled entries stay in the heap and are skipped on pop
    queue: BinaryHeap<QueueEntry>,
    // queued and running only; terminal tasks move to `history`
    tasks: HashMap<TaskId, TaskRecord>,
    history: VecDeque<TaskInfo>,
    queued: usize,
    started: bool,
}

impl Schedule {
    fn retire(&mut self, id: TaskId, state: TaskState) -> Option<String> {
        let rec = self.tasks.remove(&id)?;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(TaskInfo { id, name: rec.name.clone(), priority: rec.priority, state });
        Some(rec.name)
    }

    fn finished(&self, id: TaskId) -> Option<&TaskInfo> {
        self.history.iter().rev().find(|t| t.id == id)
    }
}

struct Dispatch {
    id: TaskId,
    name: String,
    token: CancellationToken,
    action: Action,
}

struct Shared {
    schedule: Mutex<Schedule>,
    wake: Notify,
    idle: Notify,
    permits: Arc<Semaphore>,
    bus: Arc<EventBus>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
    running: AtomicUsize,
    peak: AtomicUsize,
    max_concurrency: usize,
}

impl Shared {
    fn pop_next(&self) -> Option<Dispatch> {
        let mut guard = self.schedule.lock();
        let sched = &mut *guard;
        while let Some(entry) = sched.queue.pop() {
            let Some(rec) = sched.tasks.get_mut(&entry.id) else { continue };
            if rec.state != TaskState::Queued {
                continue;
            }
            let Some(action) = rec.action.take() else { continue };
            rec.state = TaskState::Running;
            sched.queued -= 1;
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            return Some(Dispatch {
                id: entry.id,
                name: rec.name.clone(),
                token: rec.token.clone(),
                action,
            });
        }
        None
    }

    fn finish(&self, id: TaskId, name: String, state: TaskState, outcome: TaskOutcome) {
        self.schedule.lock().retire(id, state);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.publish(id, name, outcome);
    }

    fn publish(&self, task_id: TaskId, task_name: String, outcome: TaskOutcome) {
        self.bus.publish(&EngineEvent::TaskCompleted { task_id, task_name, outcome });
        self.idle.notify_waiters();
    }

    fn is_idle(&self) -> bool {
        self.schedule.lock().queued == 0 && self.running.load(Ordering::SeqCst) == 0
    }
}

/// Priority queue drained by at most `max_concurrency` concurrently running
/// tasks on the tokio runtime that called `start_processing`.
pub struct BackgroundProcessor {
    shared: Arc<Shared>,
}

impl BackgroundProcessor {
    pub fn new(max_concurrency: usize, bus: Arc<EventBus>) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            shared: Arc::new(Shared {
                schedule: Mutex::new(Schedule::default()),
                wake: Notify::new(),
                idle: Notify::new(),
                permits: Arc::new(Semaphore::new(max_concurrency)),
                bus,
                shutdown: CancellationToken::new(),
                next_id: AtomicU64::new(1),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                max_concurrency,
            }),
        }
    }

    pub fn from_config(config: &BackgroundConfig, bus: Arc<EventBus>) -> Self {
        Self::new(config.max_concurrency, bus)
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    /// Never blocks; tasks queued before `start_processing` wait for it.
    pub fn queue_task(&self, task: BackgroundTask) -> TaskId {
        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut sched = self.shared.schedule.lock();
            sched.queue.push(QueueEntry { priority: task.priority, seq: id.0, id });
            sched.tasks.insert(
                id,
                TaskRecord {
                    name: task.name,
                    priority: task.priority,
                    state: TaskState::Queued,
                    token: self.shared.shutdown.child_token(),
                    action: Some(task.action),
                },
            );
            sched.queued += 1;
        }
        tracing::debug!(task = %id, priority = ?task.priority, "task queued");
        self.shared.wake.notify_one();
        id
    }

    pub fn start_processing(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| TaskLensError::NoRuntime)?;
        {
            let mut sched = self.shared.schedule.lock();
            if sched.started {
                return Err(TaskLensError::AlreadyStarted);
            }
            sched.started = true;
        }
        tracing::info!(max_concurrency = self.shared.max_concurrency, "background processing started");
        handle.spawn(dispatch_loop(Arc::clone(&self.shared)));
        Ok(())
    }

    pub fn cancel_task(&self, id: TaskId) -> CancelOutcome {
        let mut guard = self.shared.schedule.lock();
        let sched = &mut *guard;
        let Some(state) = sched.tasks.get(&id).map(|r| r.state) else {
            return match sched.finished(id) {
                Some(info) => CancelOutcome::refused(format!("task {id} already {}", info.state.as_str())),
                None => CancelOutcome::refused(format!("unknown task {id}")),
            };
        };
        match state {
            TaskState::Queued => {
                sched.queued -= 1;
                let name = sched.retire(id, TaskState::Cancelled).unwrap_or_default();
                drop(guard);
                tracing::debug!(task = %id, "queued task cancelled");
                self.shared.publish(id, name, TaskOutcome::Cancelled);
                CancelOutcome::ok("cancelled before start")
            }
            TaskState::Running => {
                if let Some(rec) = sched.tasks.get(&id) {
                    rec.token.cancel();
                }
                CancelOutcome::ok("cancellation requested")
            }
            state => CancelOutcome::refused(format!("task {id} already {}", state.as_str())),
        }
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        let sched = self.shared.schedule.lock();
        match sched.tasks.get(&id) {
            Some(rec) => Some(rec.state),
            None => sched.finished(id).map(|t| t.state),
        }
    }

    pub fn running_count(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// highest number of simultaneously running tasks observed so far
    pub fn peak_running(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn queued_count(&self) -> usize {
        self.shared.schedule.lock().queued
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let sched = self.shared.schedule.lock();
        let mut out: Vec<TaskInfo> = sched
            .tasks
            .iter()
            .map(|(id, r)| TaskInfo { id: *id, name: r.name.clone(), priority: r.priority, state: r.state })
            .chain(sched.history.iter().cloned())
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stops dispatching, cancels queued tasks and signals running ones.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let cancelled: Vec<(TaskId, String)> = {
            let mut guard = self.shared.schedule.lock();
            let sched = &mut *guard;
            let mut queued: Vec<TaskId> = sched
                .tasks
                .iter()
                .filter(|(_, rec)| rec.state == TaskState::Queued)
                .map(|(id, _)| *id)
                .collect();
            queued.sort();
            let mut out = Vec::new();
            for id in queued {
                if let Some(name) = sched.retire(id, TaskState::Cancelled) {
                    out.push((id, name));
                }
            }
            sched.queued = 0;
            sched.queue.clear();
            out
        };
        for (id, name) in cancelled {
            self.shared.publish(id, name, TaskOutcome::Cancelled);
        }
        tracing::info!("background processing shut down");
    }
}

impl Drop for BackgroundProcessor {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        let permit = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let next = loop {
            if let Some(job) = shared.pop_next() {
                break Some(job);
            }
            tokio::select! {
                _ = shared.shutdown.cancelled() => break None,
                _ = shared.wake.notified() => {}
            }
        };
        match next {
            Some(job) => {
                tokio::spawn(run_task(Arc::clone(&shared), job, permit));
            }
            None => break,
        }
    }
    tracing::debug!("dispatcher stopped");
}

async fn run_task(shared: Arc<Shared>, job: Dispatch, _permit: OwnedSemaphorePermit) {
    let Dispatch { id, name, token, action } = job;
    tracing::debug!(task = %id, name = %name, "task started");
    let watch = token.clone();
    let result = AssertUnwindSafe(async move { action(token).await })
        .catch_unwind()
        .await;
    let (state, outcome) = match result {
        Ok(Ok(message)) => (TaskState::Completed, TaskOutcome::Completed(message)),
        Ok(Err(_)) if watch.is_cancelled() => (TaskState::Cancelled, TaskOutcome::Cancelled),
        Ok(Err(e)) => {
            tracing::warn!(task = %id, name = %name, error = %e, "background task failed");
            (TaskState::Failed, TaskOutcome::Failed(format!("{e:#}")))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(task = %id, name = %name, panic = %message, "background task panicked");
            (TaskState::Failed, TaskOutcome::Failed(format!("panicked: {message}")))
        }
    };
    shared.finish(id, name, state, outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
