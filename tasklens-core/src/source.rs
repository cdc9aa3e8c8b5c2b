use crate::record::Record;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tasklens_common::{Result, TaskLensError};

pub type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Immutable snapshot of a record collection. A resync builds a new source
/// with a higher version instead of editing this one.
pub struct VirtualDataSource<R: Record> {
    records: Arc<[Arc<R>]>,
    version: u64,
    filter: Option<Predicate<R>>,
    filtered_count: OnceLock<usize>, // reset whenever the predicate changes
}

impl<R: Record> VirtualDataSource<R> {
    pub fn new(records: Vec<R>, version: u64) -> Self {
        let shared: Vec<Arc<R>> = records.into_iter().map(Arc::new).collect();
        Self::from_shared(shared.into(), version)
    }

    pub fn from_shared(records: Arc<[Arc<R>]>, version: u64) -> Self {
        Self {
            records,
            version,
            filter: None,
            filtered_count: OnceLock::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn records(&self) -> &Arc<[Arc<R>]> {
        &self.records
    }

    pub fn total_count(&self) -> usize {
        self.records.len()
    }

    pub fn get_item(&self, index: usize) -> Result<&Arc<R>> {
        self.records.get(index).ok_or(TaskLensError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    /// Up to `length` records starting at `start`; shorter near the end,
    /// empty past it. Callers must check the returned length.
    pub fn get_range(&self, start: usize, length: usize) -> &[Arc<R>] {
        let total = self.records.len();
        if start >= total {
            return &[];
        }
        let end = start.saturating_add(length).min(total);
        &self.records[start..end]
    }

    pub fn set_filter<F>(&mut self, predicate: F)
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self.filtered_count = OnceLock::new();
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.filtered_count = OnceLock::new();
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn filtered_count(&self) -> usize {
        *self.filtered_count.get_or_init(|| match &self.filter {
            Some(pred) => self.records.iter().filter(|r| pred(r)).count(),
            None => self.records.len(),
        })
    }

    /// Window over the records matching the active predicate. Scans lazily and
    /// stops once `length` matches past `start` were collected.
    pub fn get_filtered_range(&self, start: usize, length: usize) -> Vec<Arc<R>> {
        match &self.filter {
            Some(pred) => self
                .records
                .iter()
                .filter(|r| pred(r))
                .skip(start)
                .take(length)
                .cloned()
                .collect(),
            None => self.get_range(start, length).to_vec(),
        }
    }
}

impl<R: Record> Clone for VirtualDataSource<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            version: self.version,
            filter: self.filter.clone(),
            filtered_count: self.filtered_count.clone(),
        }
    }
}

impl<R: Record> fmt::Debug for VirtualDataSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDataSource")
            .field("total", &self.records.len())
            .field("version", &self.version)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Status, Task};

    fn source(n: u64) -> VirtualDataSource<Task> {
        let tasks = (1..=n).map(|i| Task::new(i, format!("task {i}"), Status::Pending)).collect();
        VirtualDataSource::new(tasks, 1)
    }

    #[test]
    fn range_truncates_at_end() {
        let src = source(10_000);
        let r = src.get_range(9990, 50);
        assert_eq!(r.len(), 10);
        assert_eq!(r[0].id, 9991);
    }

    #[test]
    fn range_past_end_is_empty() {
        let src = source(5);
        assert!(src.get_range(5, 3).is_empty());
        assert!(src.get_range(usize::MAX, usize::MAX).is_empty());
    }

    #[test]
    fn get_item_out_of_range() {
        let src = source(3);
        assert_eq!(src.get_item(2).unwrap().id, 3);
        assert!(matches!(
            src.get_item(3),
            Err(TaskLensError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn filtered_count_and_range_follow_predicate() {
        let mut src = source(100);
        assert_eq!(src.filtered_count(), 100);
        src.set_filter(|t: &Task| t.id % 2 == 0);
        assert_eq!(src.filtered_count(), 50);
        let r = src.get_filtered_range(10, 3);
        assert_eq!(r.iter().map(|t| t.id).collect::<Vec<_>>(), vec![22, 24, 26]);
        src.clear_filter();
        assert_eq!(src.filtered_count(), 100);
    }

    #[test]
    fn clone_shares_records() {
        let src = source(4);
        let copy = src.clone();
        assert!(Arc::ptr_eq(src.records(), copy.records()));
    }
}
