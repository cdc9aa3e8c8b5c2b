//! Reusable buffers for the per-frame and per-query hot paths.

use crate::viewport::StyledLine;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_POOL_SIZE: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub available: usize,
    pub created: usize,
    pub gets: usize,
    pub puts: usize,
    pub discarded: usize,
}

/// Pool of cleared `Vec<T>`s. Buffers whose capacity grew past
/// `max_capacity` are dropped on return instead of being retained.
pub struct BufferPool<T> {
    name: String,
    pool: Mutex<Vec<Vec<T>>>,
    pool_size: usize,
    default_capacity: usize,
    max_capacity: usize,
    created: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
    discarded: AtomicUsize,
}

impl<T> BufferPool<T> {
    pub fn new(name: &str, default_capacity: usize, max_capacity: usize) -> Self {
        Self::with_pool_size(name, default_capacity, max_capacity, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(name: &str, default_capacity: usize, max_capacity: usize, pool_size: usize) -> Self {
        Self {
            name: name.to_string(),
            pool: Mutex::new(Vec::with_capacity(pool_size)),
            pool_size,
            default_capacity,
            max_capacity: max_capacity.max(default_capacity),
            created: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> Vec<T> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        match self.pool.lock().pop() {
            Some(buf) => buf,
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.default_capacity)
            }
        }
    }

    pub fn put(&self, mut buf: Vec<T>) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        if buf.capacity() > self.max_capacity {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        buf.clear();
        let mut pool = self.pool.lock();
        if pool.len() < self.pool_size {
            pool.push(buf);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            available: self.pool.lock().len(),
            created: self.created.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// The pools shared by the viewport (line scratch) and the filter engine
/// (match index scratch).
pub struct ResourceManager {
    lines: BufferPool<StyledLine>,
    indices: BufferPool<usize>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            lines: BufferPool::new("lines", 64, 4096),
            indices: BufferPool::new("indices", 1024, 1 << 22),
        }
    }

    pub fn lines(&self) -> &BufferPool<StyledLine> {
        &self.lines
    }

    pub fn indices(&self) -> &BufferPool<usize> {
        &self.indices
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        vec![self.lines.stats(), self.indices.stats()]
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
