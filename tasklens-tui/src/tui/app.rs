use crate::render::TaskRenderer;
use crate::tui::session::Session;
use crate::tui::theme::Theme;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tasklens_common::Config;
use tasklens_core::{
    resync_task, BackgroundProcessor, BackgroundTask, DataProvider, EngineEvent, EventBus, EventKind,
    FilterEngine, LineBuffer, RenderStats, Sorter, Task, TaskId, TaskOutcome, TaskPriority, VirtualScrollingViewport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    QueryInput,
    Help,
}

/// Engine events forwarded from bus handlers (any thread) to the UI loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    DataChanged { version: u64, total: usize },
    Results(usize),
    TaskDone { id: TaskId, name: String, outcome: TaskOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedQuery {
    pub query: String,
    pub count: Option<usize>,
}

pub struct App {
    pub input_path: String,
    pub config: Config,
    pub theme: Theme,
    pub engine: Arc<FilterEngine<Task>>,
    pub processor: Arc<BackgroundProcessor>,
    pub provider: Arc<dyn DataProvider<Task>>,
    pub viewport: VirtualScrollingViewport<Task>,
    pub mode: Mode,
    pub query_input: String,
    pub active_query: String,
    pub saved_queries: Vec<SavedQuery>,
    pub result_count: usize,
    pub status_msg: String,
    pub last_outcome: Option<String>,
    pub should_quit: bool,
    pub watch_rx: Option<Receiver<()>>, // file change signals from the watcher
    events_rx: Receiver<UiEvent>,
    pending_counts: HashMap<TaskId, usize>, // count task -> saved query index
}

impl App {
    pub fn new(
        input_path: String,
        config: Config,
        engine: Arc<FilterEngine<Task>>,
        processor: Arc<BackgroundProcessor>,
        provider: Arc<dyn DataProvider<Task>>,
    ) -> Self {
        let (tx, events_rx) = mpsc::channel();
        forward_events(engine.bus(), tx);
        let mut viewport = VirtualScrollingViewport::new(80, 20)
            .with_event_bus(Arc::clone(engine.bus()))
            .with_resources(Arc::clone(engine.resources()))
            .with_monitor(Arc::clone(engine.monitor()));
        viewport.set_item_renderer(Arc::new(TaskRenderer::new(config.display.show_annotations)));
        Self {
            input_path,
            theme: Theme::from_name(&config.display.theme),
            config,
            engine,
            processor,
            provider,
            viewport,
            mode: Mode::Browse,
            query_input: String::new(),
            active_query: String::new(),
            saved_queries: Vec::new(),
            result_count: 0,
            status_msg: String::from("Loading..."),
            last_outcome: None,
            should_quit: false,
            watch_rx: None,
            events_rx,
            pending_counts: HashMap::new(),
        }
    }

    /// Re-reads filtered results into the viewport, keeping the cursor row.
    pub fn refresh(&mut self) {
        let cursor = self.viewport.cursor();
        let results = self.engine.filtered_results();
        self.result_count = results.len();
        self.viewport.set_data_source(results.as_source());
        self.viewport.move_cursor(cursor as isize);
    }

    pub fn apply_query(&mut self, text: &str) {
        let parsed = self.engine.apply_query(text);
        self.active_query = text.trim().to_string();
        self.viewport.scroll_to_top();
        self.refresh();
        self.status_msg = if parsed.ignored.is_empty() {
            format!("{} filter(s)", parsed.filters.len())
        } else {
            format!("{} filter(s), ignored: {}", parsed.filters.len(), parsed.ignored.join(" "))
        };
    }

    pub fn begin_query(&mut self) {
        self.query_input = self.active_query.clone();
        self.mode = Mode::QueryInput;
    }

    pub fn submit_query(&mut self) {
        let text = std::mem::take(&mut self.query_input);
        self.mode = Mode::Browse;
        self.apply_query(&text);
    }

    pub fn cancel_query(&mut self) {
        self.query_input.clear();
        self.mode = Mode::Browse;
    }

    pub fn clear_query(&mut self) {
        self.engine.clear_filters();
        self.active_query.clear();
        self.refresh();
        self.status_msg = "filters cleared".into();
    }

    /// none -> urgency desc -> due asc -> project asc -> none
    pub fn cycle_sorter(&mut self) {
        let next = match self.engine.sorter() {
            None => Some(Sorter::Urgency { descending: true }),
            Some(Sorter::Urgency { .. }) => Some(Sorter::DueDate { descending: false }),
            Some(Sorter::DueDate { .. }) => Some(Sorter::Project { descending: false }),
            Some(Sorter::Project { .. }) => None,
        };
        self.engine.set_sorter(next);
        self.refresh();
        self.status_msg = format!("sort: {}", self.sorter_label());
    }

    pub fn sorter_label(&self) -> &'static str {
        match self.engine.sorter() {
            None => "file order",
            Some(Sorter::Urgency { descending: true }) => "urgency-",
            Some(Sorter::Urgency { descending: false }) => "urgency+",
            Some(Sorter::DueDate { descending: true }) => "due-",
            Some(Sorter::DueDate { descending: false }) => "due+",
            Some(Sorter::Project { descending: true }) => "project-",
            Some(Sorter::Project { descending: false }) => "project+",
        }
    }

    /// Remember the active query and count its matches in the background.
    pub fn save_current_query(&mut self) {
        if self.active_query.is_empty() {
            self.status_msg = "nothing to save".into();
            return;
        }
        let index = match self.saved_queries.iter().position(|s| s.query == self.active_query) {
            Some(i) => i,
            None => {
                self.saved_queries.push(SavedQuery { query: self.active_query.clone(), count: None });
                self.saved_queries.len() - 1
            }
        };
        self.queue_count(index);
    }

    /// Applies the saved query after the active one, wrapping around.
    pub fn next_saved_query(&mut self) {
        if self.saved_queries.is_empty() {
            self.status_msg = "no saved queries".into();
            return;
        }
        let next = self
            .saved_queries
            .iter()
            .position(|s| s.query == self.active_query)
            .map_or(0, |i| (i + 1) % self.saved_queries.len());
        let query = self.saved_queries[next].query.clone();
        self.apply_query(&query);
    }

    pub fn recount_saved(&mut self) {
        for i in 0..self.saved_queries.len() {
            self.queue_count(i);
        }
    }

    fn queue_count(&mut self, index: usize) {
        let Some(saved) = self.saved_queries.get_mut(index) else { return };
        saved.count = None;
        let query = saved.query.clone();
        let engine = Arc::clone(&self.engine);
        let task = BackgroundTask::new(format!("count {query}"), TaskPriority::Low, move |_| async move {
            Ok(engine.count_query(&query).to_string())
        });
        let id = self.processor.queue_task(task);
        self.pending_counts.insert(id, index);
    }

    pub fn request_reload(&mut self) {
        let task = resync_task(Arc::clone(&self.engine), Arc::clone(&self.provider), TaskPriority::High);
        self.processor.queue_task(task);
        self.status_msg = "reloading...".into();
    }

    /// Coalesces pending watcher signals into one reload.
    pub fn poll_watch(&mut self) {
        let changed = match &self.watch_rx {
            Some(rx) => rx.try_iter().count() > 0,
            None => false,
        };
        if changed {
            self.request_reload();
        }
    }

    pub fn drain_events(&mut self) {
        while let Ok(ev) = self.events_rx.try_recv() {
            match ev {
                UiEvent::DataChanged { version, total } => {
                    self.refresh();
                    self.status_msg = format!("loaded {total} tasks (v{version})");
                    if !self.saved_queries.is_empty() {
                        self.recount_saved();
                    }
                }
                UiEvent::Results(n) => self.result_count = n,
                UiEvent::TaskDone { id, name, outcome } => {
                    if let Some(index) = self.pending_counts.remove(&id) {
                        if let (Some(saved), TaskOutcome::Completed(msg)) = (self.saved_queries.get_mut(index), &outcome) {
                            saved.count = msg.parse().ok();
                        }
                    }
                    self.last_outcome = Some(match outcome {
                        TaskOutcome::Completed(msg) => format!("{name}: {msg}"),
                        TaskOutcome::Failed(err) => format!("{name} failed: {err}"),
                        TaskOutcome::Cancelled => format!("{name} cancelled"),
                    });
                }
            }
        }
    }

    pub fn resize_viewport(&mut self, width: u16, height: u16) {
        if self.viewport.width() != width as usize || self.viewport.height() != height as usize {
            self.viewport.resize(width as usize, height as usize);
        }
    }

    pub fn page_size(&self) -> usize {
        self.config.display.page_size.unwrap_or(self.viewport.height()).max(1)
    }

    pub fn render_list(&self) -> (LineBuffer, RenderStats) {
        let mut buf = LineBuffer::new(self.viewport.width(), self.viewport.height());
        let stats = self.viewport.render_to_buffer(&mut buf);
        (buf, stats)
    }

    /// Operations whose mean time is over budget, e.g. `viewport.render 23ms>16ms`.
    pub fn regression_summary(&self) -> Option<String> {
        let regressions = self.engine.monitor().regressions();
        if regressions.is_empty() {
            return None;
        }
        let parts: Vec<String> = regressions
            .iter()
            .map(|r| format!("{} {}ms>{}ms", r.operation, r.mean.as_millis(), r.budget.as_millis()))
            .collect();
        Some(parts.join(", "))
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.engine.cache_stats().hit_rate()
    }

    pub fn total_count(&self) -> usize {
        self.engine.data_source().total_count()
    }

    pub fn to_session(&self) -> Session {
        Session {
            input_path: self.input_path.clone(),
            last_query: self.active_query.clone(),
            cursor: self.viewport.cursor(),
            saved_queries: self.saved_queries.iter().map(|s| s.query.clone()).collect(),
        }
    }

    /// Restores query and cursor only when the session belongs to this file.
    pub fn restore_from_session(&mut self, session: &Session) {
        if session.input_path != self.input_path {
            self.refresh();
            return;
        }
        self.saved_queries = session
            .saved_queries
            .iter()
            .map(|q| SavedQuery { query: q.clone(), count: None })
            .collect();
        if session.last_query.is_empty() {
            self.refresh();
        } else {
            self.apply_query(&session.last_query);
        }
        self.viewport.move_cursor(session.cursor as isize);
    }
}

fn forward_events(bus: &EventBus, tx: Sender<UiEvent>) {
    let data_tx = tx.clone();
    bus.subscribe(EventKind::DataSourceChanged, move |ev| {
        if let EngineEvent::DataSourceChanged { version, total_count } = ev {
            data_tx.send(UiEvent::DataChanged { version: *version, total: *total_count })?;
        }
        Ok(())
    });
    let results_tx = tx.clone();
    bus.subscribe(EventKind::FilterResultsChanged, move |ev| {
        if let EngineEvent::FilterResultsChanged { result_count } = ev {
            results_tx.send(UiEvent::Results(*result_count))?;
        }
        Ok(())
    });
    bus.subscribe(EventKind::TaskCompleted, move |ev| {
        if let EngineEvent::TaskCompleted { task_id, task_name, outcome } = ev {
            tx.send(UiEvent::TaskDone { id: *task_id, name: task_name.clone(), outcome: outcome.clone() })?;
        }
        Ok(())
    });
}

#[cfg(test)]
pub(crate) mod tests_app {
    use super::*;
    use tasklens_core::{load_into, Status, StaticProvider};

    pub(crate) fn sample_tasks() -> Vec<Task> {
        (1..=60u64)
            .map(|i| {
                let status = if i % 3 == 0 { Status::Completed } else { Status::Pending };
                Task::new(i, format!("task {i}"), status).with_project(if i % 2 == 0 { "work" } else { "home" })
            })
            .collect()
    }

    pub(crate) fn app() -> App {
        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(FilterEngine::new(Arc::clone(&bus)));
        let processor = Arc::new(BackgroundProcessor::new(2, Arc::clone(&bus)));
        let provider: Arc<dyn DataProvider<Task>> = Arc::new(StaticProvider::new("sample", sample_tasks()));
        load_into(&engine, provider.as_ref()).unwrap();
        let mut app = App::new("sample.json".into(), Config::default(), engine, processor, provider);
        app.resize_viewport(80, 10);
        app.refresh();
        app
    }

    #[test]
    fn query_narrows_results() {
        let mut app = app();
        assert_eq!(app.result_count, 60);
        app.apply_query("project:work status:pending bogus");
        assert_eq!(app.result_count, 20);
        assert_eq!(app.viewport.total_count(), 20);
        assert!(app.status_msg.contains("ignored: bogus"));
        app.clear_query();
        assert_eq!(app.result_count, 60);
    }

    #[test]
    fn session_restores_only_same_file() {
        let mut app = app();
        let session = Session {
            input_path: "sample.json".into(),
            last_query: "project:home".into(),
            cursor: 5,
            saved_queries: vec!["status:completed".into()],
        };
        app.restore_from_session(&session);
        assert_eq!(app.active_query, "project:home");
        assert_eq!(app.viewport.cursor(), 5);
        assert_eq!(app.saved_queries.len(), 1);
        assert_eq!(app.to_session().cursor, 5);

        let mut other = self::app();
        other.restore_from_session(&Session { input_path: "else.json".into(), ..session });
        assert!(other.active_query.is_empty());
    }

    #[test]
    fn data_change_event_refreshes_view() {
        let mut app = app();
        app.apply_query("project:work");
        app.engine.resync(sample_tasks().into_iter().take(10).collect());
        app.drain_events();
        assert_eq!(app.result_count, 5);
        assert!(app.status_msg.starts_with("loaded 10 tasks"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saved_query_counts_arrive_from_background() {
        let mut app = app();
        app.processor.start_processing().unwrap();
        app.apply_query("status:completed");
        app.save_current_query();
        app.request_reload();
        app.processor.wait_idle().await;
        // the reload queues a recount of every saved query
        app.drain_events();
        app.processor.wait_idle().await;
        app.drain_events();
        assert_eq!(app.saved_queries[0].count, Some(20));
        assert!(app.last_outcome.is_some());
    }

    #[test]
    fn sorter_cycles_back_to_file_order() {
        let mut app = app();
        app.cycle_sorter();
        assert_eq!(app.sorter_label(), "urgency-");
        app.cycle_sorter();
        app.cycle_sorter();
        assert_eq!(app.sorter_label(), "project+");
        assert_eq!(app.viewport.selected_item().and_then(|t| t.project.clone()).as_deref(), Some("home"));
        app.cycle_sorter();
        assert!(app.engine.sorter().is_none());
    }

    #[test]
    fn slow_operations_are_summarised() {
        let app = app();
        assert!(app.regression_summary().is_none());
        let monitor = app.engine.monitor();
        monitor.set_budget("reload.parse", std::time::Duration::from_millis(16));
        monitor.record("reload.parse", std::time::Duration::from_millis(40));
        assert_eq!(app.regression_summary().as_deref(), Some("reload.parse 40ms>16ms"));
    }

    #[test]
    fn rendered_list_fills_viewport() {
        let app = app();
        let (buf, stats) = app.render_list();
        assert_eq!(stats.rows_written, 10);
        assert!(buf.text(0).contains("task 1"));
    }
}
