use crate::cache::{CacheManager, CacheStats, CacheWeight};
use crate::events::{EngineEvent, EventBus};
use crate::filter::{Filter, Sorter};
use crate::monitor::PerformanceMonitor;
use crate::query::{ParsedQuery, QueryLanguageParser};
use crate::record::Record;
use crate::resources::ResourceManager;
use crate::source::VirtualDataSource;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;
use tasklens_common::Config;
use xxhash_rust::xxh3::xxh3_64;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_PARALLEL_THRESHOLD: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub filters: u64,
    pub sorter: u64,
    /// bumped by the engine on every source swap, independent of the source's own version
    pub generation: u64,
}

/// Filtered and sorted view over a source snapshot. Shares the record
/// `Arc`s with the source it came from.
pub struct FilteredResults<R> {
    records: Arc<[Arc<R>]>,
    version: u64,
}

impl<R: Record> FilteredResults<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn records(&self) -> &[Arc<R>] {
        &self.records
    }

    pub fn first(&self) -> Option<&Arc<R>> {
        self.records.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<R>> {
        self.records.iter()
    }

    /// Wrap as a data source for a viewport without copying records.
    pub fn as_source(&self) -> VirtualDataSource<R> {
        VirtualDataSource::from_shared(Arc::clone(&self.records), self.version)
    }
}

impl<R> Clone for FilteredResults<R> {
    fn clone(&self) -> Self {
        Self { records: Arc::clone(&self.records), version: self.version }
    }
}

impl<R> fmt::Debug for FilteredResults<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredResults")
            .field("len", &self.records.len())
            .field("version", &self.version)
            .finish()
    }
}

impl<R> CacheWeight for FilteredResults<R> {
    fn weight(&self) -> usize {
        size_of::<Self>() + self.records.len() * size_of::<Arc<R>>()
    }
}

struct EngineState<R: Record> {
    source: VirtualDataSource<R>,
    generation: u64,
    filters: Vec<Filter>,
    sorter: Option<Sorter>,
}

impl<R: Record> EngineState<R> {
    fn key(&self) -> CacheKey {
        let filters = self
            .filters
            .iter()
            .map(Filter::signature)
            .collect::<Vec<_>>()
            .join("&");
        let sorter = self.sorter.map(|s| s.signature()).unwrap_or_default();
        CacheKey {
            filters: xxh3_64(filters.as_bytes()),
            sorter: xxh3_64(sorter.as_bytes()),
            generation: self.generation,
        }
    }

    fn replace_source(&mut self, source: VirtualDataSource<R>) {
        self.source = source;
        self.generation += 1;
    }
}

/// Applies the active filters (AND, in insertion order) and sorter to the
/// current source, caching each distinct result.
pub struct FilterEngine<R: Record> {
    state: RwLock<EngineState<R>>,
    cache: Mutex<CacheManager<CacheKey, FilteredResults<R>>>,
    bus: Arc<EventBus>,
    parser: QueryLanguageParser,
    monitor: Arc<PerformanceMonitor>,
    resources: Arc<ResourceManager>,
    ttl: Duration,
    parallel_threshold: usize,
}

impl<R: Record> FilterEngine<R> {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: RwLock::new(EngineState {
                source: VirtualDataSource::empty(),
                generation: 0,
                filters: Vec::new(),
                sorter: None,
            }),
            cache: Mutex::new(CacheManager::new(DEFAULT_CACHE_BYTES)),
            bus,
            parser: QueryLanguageParser::new(),
            monitor: Arc::new(PerformanceMonitor::new()),
            resources: Arc::new(ResourceManager::new()),
            ttl: DEFAULT_TTL,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    pub fn from_config(config: &Config, bus: Arc<EventBus>) -> Self {
        let engine = Self::new(bus)
            .with_cache(config.engine.cache_max_bytes, Duration::from_secs(config.engine.cache_ttl_secs))
            .with_parallel_threshold(config.engine.parallel_threshold);
        engine
            .monitor
            .set_budget("filter.evaluate", Duration::from_millis(config.performance.filter_budget_ms));
        engine
            .monitor
            .set_budget("viewport.render", Duration::from_millis(config.performance.frame_budget_ms));
        engine
    }

    pub fn with_cache(mut self, max_bytes: usize, ttl: Duration) -> Self {
        self.cache = Mutex::new(CacheManager::new(max_bytes));
        self.ttl = ttl;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    pub fn with_parser(mut self, parser: QueryLanguageParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_resources(mut self, resources: Arc<ResourceManager>) -> Self {
        self.resources = resources;
        self
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // --- source ---

    /// Every cached result is dropped, whatever version the new source carries.
    pub fn set_data_source(&self, source: VirtualDataSource<R>) {
        let (version, total_count) = (source.version(), source.total_count());
        self.state.write().replace_source(source);
        self.source_replaced(version, total_count);
    }

    /// Swap in a fresh snapshot with the next version; returns that version.
    /// Concurrent resyncs each get a distinct version.
    pub fn resync(&self, records: Vec<R>) -> u64 {
        let shared: Arc<[Arc<R>]> = records.into_iter().map(Arc::new).collect();
        let total_count = shared.len();
        let version = {
            let mut st = self.state.write();
            let version = st.source.version() + 1;
            st.replace_source(VirtualDataSource::from_shared(shared, version));
            version
        };
        self.source_replaced(version, total_count);
        version
    }

    fn source_replaced(&self, version: u64, total_count: usize) {
        self.clear_cache();
        tracing::info!(version, total_count, "data source replaced");
        self.bus.publish(&EngineEvent::DataSourceChanged { version, total_count });
    }

    pub fn data_source(&self) -> VirtualDataSource<R> {
        self.state.read().source.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.read().source.version()
    }

    // --- filters ---

    pub fn add_filter(&self, filter: Filter) {
        let filter_count = {
            let mut st = self.state.write();
            st.filters.push(filter);
            st.filters.len()
        };
        self.filters_changed(filter_count);
    }

    pub fn clear_filters(&self) {
        self.state.write().filters.clear();
        self.filters_changed(0);
    }

    pub fn set_sorter(&self, sorter: Option<Sorter>) {
        self.state.write().sorter = sorter;
        self.invalidate_stale();
    }

    /// Replace the active filters with the parsed query. Unknown tokens are
    /// dropped; a `sort:` token also replaces the sorter.
    pub fn apply_query(&self, text: &str) -> ParsedQuery {
        let parsed = self.parser.parse(text);
        let filter_count = {
            let mut st = self.state.write();
            st.filters = parsed.filters.clone();
            if let Some(sorter) = parsed.sorter {
                st.sorter = Some(sorter);
            }
            st.filters.len()
        };
        self.filters_changed(filter_count);
        parsed
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.state.read().filters.clone()
    }

    pub fn filter_count(&self) -> usize {
        self.state.read().filters.len()
    }

    pub fn sorter(&self) -> Option<Sorter> {
        self.state.read().sorter
    }

    // --- results ---

    pub fn filtered_results(&self) -> FilteredResults<R> {
        let (key, source, filters, sorter) = {
            let st = self.state.read();
            (st.key(), st.source.clone(), st.filters.clone(), st.sorter)
        };
        let version = source.version();
        if let Some(hit) = self.cache.lock().get(&key) {
            tracing::debug!(?key, "filter cache hit");
            return hit;
        }
        tracing::debug!(?key, "filter cache miss");
        let records = self.monitor.time("filter.evaluate", || self.evaluate(&source, &filters, sorter));
        let results = FilteredResults { records, version };
        // a swap or filter change during evaluation makes this key dead; don't store it
        let current = self.state.read().key() == key;
        let bytes = {
            let mut cache = self.cache.lock();
            if current {
                cache.set(key, results.clone(), self.ttl);
            }
            cache.stats().bytes
        };
        self.monitor.set_gauge("filter.cache", bytes);
        self.bus.publish(&EngineEvent::FilterResultsChanged { result_count: results.len() });
        results
    }

    /// Counts matches for `text` against the current source without touching
    /// the active filters or the cache.
    pub fn count_query(&self, text: &str) -> usize {
        let filters = self.parser.parse_filters(text);
        let source = self.data_source();
        self.monitor.time("filter.count", || {
            let records = source.records();
            let matches = |r: &Arc<R>| filters.iter().all(|f| f.matches(r.as_ref()));
            if records.len() >= self.parallel_threshold {
                records.par_iter().filter(|r| matches(*r)).count()
            } else {
                records.iter().filter(|r| matches(*r)).count()
            }
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        self.monitor.set_gauge("filter.cache", 0);
    }

    fn evaluate(&self, source: &VirtualDataSource<R>, filters: &[Filter], sorter: Option<Sorter>) -> Arc<[Arc<R>]> {
        let records = source.records();
        let matches = |i: usize| filters.iter().all(|f| f.matches(records[i].as_ref()));
        let mut idx = self.resources.indices().get();
        if filters.is_empty() {
            idx.extend(0..records.len());
        } else if records.len() >= self.parallel_threshold {
            idx.par_extend((0..records.len()).into_par_iter().filter(|&i| matches(i)));
        } else {
            idx.extend((0..records.len()).filter(|&i| matches(i)));
        }
        if let Some(sorter) = sorter {
            // stable: ties keep source order
            idx.sort_by(|&a, &b| sorter.compare(records[a].as_ref(), records[b].as_ref()));
        }
        let out: Arc<[Arc<R>]> = idx.iter().map(|&i| Arc::clone(&records[i])).collect();
        self.resources.indices().put(idx);
        out
    }

    fn filters_changed(&self, filter_count: usize) {
        self.invalidate_stale();
        self.bus.publish(&EngineEvent::FiltersChanged { filter_count });
    }

    // drop every entry that no longer matches the current filters, sorter and generation
    fn invalidate_stale(&self) {
        let current = self.state.read().key();
        let dropped = self.cache.lock().invalidate(|k| *k != current);
        if dropped > 0 {
            tracing::debug!(dropped, "filter cache entries invalidated");
        }
    }
}

#[cfg(test)]
mod tests_filter_engine {
    use super::*;
    use crate::events::EventKind;
    use crate::record::{Priority, Status, Task};

    fn tasks(n: u64) -> Vec<Task> {
        (1..=n)
            .map(|i| {
                let status = match i % 4 {
                    0 => Status::Pending,
                    1 => Status::Waiting,
                    2 => Status::Completed,
                    _ => Status::Deleted,
                };
                Task::new(i, format!("task {i}"), status)
                    .with_project(if i % 2 == 0 { "work" } else { "home" })
                    .with_urgency((i % 10) as f64)
            })
            .collect()
    }

    fn engine(n: u64) -> FilterEngine<Task> {
        let e = FilterEngine::new(Arc::new(EventBus::new()));
        e.set_data_source(VirtualDataSource::new(tasks(n), 1));
        e
    }

    #[test]
    fn no_filters_returns_everything_in_order() {
        let e = engine(20);
        let r = e.filtered_results();
        assert_eq!(r.len(), 20);
        assert_eq!(r.first().map(|t| t.id), Some(1));
    }

    #[test]
    fn parallel_and_sequential_paths_agree() {
        let seq = engine(1_000);
        let par = FilterEngine::new(Arc::new(EventBus::new())).with_parallel_threshold(1);
        par.set_data_source(VirtualDataSource::new(tasks(1_000), 1));
        for e in [&seq, &par] {
            e.add_filter(Filter::Project("work".into()));
            e.set_sorter(Some(Sorter::Urgency { descending: true }));
        }
        let a: Vec<u64> = seq.filtered_results().iter().map(|t| t.id).collect();
        let b: Vec<u64> = par.filtered_results().iter().map(|t| t.id).collect();
        assert_eq!(a, b);
        assert_eq!(seq.count_query("project:work"), par.count_query("project:work"));
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let e = engine(40);
        e.set_sorter(Some(Sorter::Project { descending: false }));
        let r = e.filtered_results();
        let homes: Vec<u64> = r.iter().take_while(|t| t.project() == Some("home")).map(|t| t.id).collect();
        assert_eq!(homes.len(), 20);
        assert!(homes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn events_arrive_filters_first() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::FiltersChanged, EventKind::FilterResultsChanged] {
            let log = Arc::clone(&log);
            bus.subscribe(kind, move |ev| {
                log.lock().push(ev.kind());
                Ok(())
            });
        }
        let e = FilterEngine::new(Arc::clone(&bus));
        e.set_data_source(VirtualDataSource::new(tasks(8), 1));
        e.add_filter(Filter::Status(Status::Pending));
        e.filtered_results();
        e.filtered_results(); // cached: no second results event
        assert_eq!(*log.lock(), vec![EventKind::FiltersChanged, EventKind::FilterResultsChanged]);
    }

    #[test]
    fn resync_bumps_version_and_drops_cache() {
        let e = engine(10);
        e.filtered_results();
        assert_eq!(e.cache_stats().entries, 1);
        let v = e.resync(tasks(30));
        assert_eq!(v, 2);
        assert_eq!(e.cache_stats().entries, 0);
        let r = e.filtered_results();
        assert_eq!((r.len(), r.version()), (30, 2));
    }

    #[test]
    fn same_version_swap_never_serves_old_results() {
        let e = FilterEngine::new(Arc::new(EventBus::new()));
        e.set_data_source(VirtualDataSource::new(vec![Task::new(1, "only", Status::Pending)], 1));
        e.add_filter(Filter::Status(Status::Pending));
        assert_eq!(e.filtered_results().len(), 1);
        let fresh: Vec<Task> = (1..=10).map(|i| Task::new(i, format!("t{i}"), Status::Pending)).collect();
        e.set_data_source(VirtualDataSource::new(fresh, 1));
        let r = e.filtered_results();
        assert_eq!(r.len(), 10);
        assert_eq!(r.records().last().map(|t| t.id), Some(10));
    }

    #[test]
    fn concurrent_resyncs_get_distinct_versions() {
        let e = engine(10);
        let mut versions: Vec<u64> = std::thread::scope(|s| {
            let e = &e;
            let handles: Vec<_> = (0..8).map(|i| s.spawn(move || e.resync(tasks(5 + i)))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        versions.sort_unstable();
        assert_eq!(versions, (2..=9).collect::<Vec<u64>>());
        assert_eq!(e.version(), 9);
        let r = e.filtered_results();
        assert_eq!(r.len(), e.data_source().total_count());
    }

    #[test]
    fn readers_see_whole_filter_sets_while_writer_toggles() {
        let e = engine(2_000);
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..200 {
                    e.add_filter(Filter::Status(Status::Pending));
                    e.clear_filters();
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let r = e.filtered_results();
                        match r.len() {
                            2_000 => {}
                            500 => assert!(r.iter().all(|t| t.status == Status::Pending)),
                            n => panic!("inconsistent result size {n}"),
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn readers_never_mix_sources_during_resync() {
        let e = engine(100);
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..100 {
                    e.resync(tasks(if i % 2 == 0 { 200 } else { 100 }));
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let r = e.filtered_results();
                        assert!(r.len() == 100 || r.len() == 200);
                        assert!(r.iter().enumerate().all(|(i, t)| t.id == i as u64 + 1));
                    }
                });
            }
        });
        assert_eq!(e.filtered_results().len(), 100);
    }

    #[test]
    fn apply_query_replaces_filters_and_sets_sorter() {
        let e = engine(100);
        e.add_filter(Filter::Priority(Priority::High));
        let parsed = e.apply_query("project:work sort:urgency- bogus");
        assert_eq!(parsed.ignored, vec!["bogus".to_string()]);
        assert_eq!(e.filter_count(), 1);
        assert_eq!(e.sorter(), Some(Sorter::Urgency { descending: true }));
        let r = e.filtered_results();
        assert_eq!(r.len(), 50);
        assert!(r.records().windows(2).all(|w| w[0].urgency >= w[1].urgency));
    }

    #[test]
    fn count_query_leaves_active_filters_alone() {
        let e = engine(100);
        e.add_filter(Filter::Status(Status::Completed));
        assert_eq!(e.count_query("status:pending"), 25);
        assert_eq!(e.filter_count(), 1);
        assert_eq!(e.filtered_results().len(), 25);
    }

    #[test]
    fn results_wrap_as_source_without_copy() {
        let e = engine(10);
        e.add_filter(Filter::Project("home".into()));
        let r = e.filtered_results();
        let src = r.as_source();
        assert_eq!(src.total_count(), 5);
        assert!(Arc::ptr_eq(&r.records()[0], src.get_item(0).unwrap()));
    }

    #[test]
    fn cache_gauge_tracks_bytes() {
        let e = engine(10);
        e.filtered_results();
        assert_eq!(e.monitor().gauge("filter.cache"), Some(e.cache_stats().bytes));
        e.clear_cache();
        assert_eq!(e.monitor().gauge("filter.cache"), Some(0));
    }
}
