// In-memory sink
//
// Bounded by key count and total bytes. When a limit is hit the oldest write is
// evicted first, tracked through a write-order index.

use super::{validate_name, HlsSink};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_MEMORY_BYTES: usize = 256 * 1024 * 1024;
const DEFAULT_MAX_KEYS: usize = 1_000;

struct Entry {
    data: Bytes,
    order: u64,
    written_at: Instant,
    writes: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// write order -> name
    order_index: BTreeMap<u64, String>,
    next_order: u64,
    total_bytes: usize,
}

impl Inner {
    fn remove(&mut self, name: &str) -> Option<Entry> {
        let entry = self.entries.remove(name)?;
        self.total_bytes -= entry.data.len();
        self.order_index.remove(&entry.order);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, name)) = self.order_index.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&name) {
            self.total_bytes -= entry.data.len();
        }
        true
    }

    fn make_room(&mut self, incoming: usize, max_keys: usize, max_bytes: usize) -> usize {
        let mut evicted = 0;
        while max_keys > 0 && self.entries.len() >= max_keys && self.evict_oldest() {
            evicted += 1;
        }
        while max_bytes > 0 && self.total_bytes + incoming > max_bytes && self.evict_oldest() {
            evicted += 1;
        }
        evicted
    }
}

/// Keeps every uploaded resource in memory. Cloning shares the same store.
#[derive(Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
    max_memory_bytes: usize,
    max_keys: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_KEYS)
    }

    /// `0` disables a limit.
    #[must_use]
    pub fn with_limits(max_memory_bytes: usize, max_keys: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            max_memory_bytes,
            max_keys,
        }
    }

    #[must_use]
    pub fn read(&self, name: &str) -> Option<Bytes> {
        self.inner.lock().entries.get(name).map(|e| e.data.clone())
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.inner.lock().entries.contains_key(name)
    }

    /// How many times `name` was written.
    #[must_use]
    pub fn write_count(&self, name: &str) -> u64 {
        self.inner.lock().entries.get(name).map_or(0, |e| e.writes)
    }

    /// Stored names, oldest write first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().order_index.values().cloned().collect()
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.inner.lock().total_bytes
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn delete(&self, name: &str) -> bool {
        self.inner.lock().remove(name).is_some()
    }
}

#[async_trait]
impl HlsSink for MemorySink {
    fn label(&self) -> &str {
        "memory"
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        validate_name(name)?;
        let size = data.len();
        if self.max_memory_bytes > 0 && size > self.max_memory_bytes {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "{name} ({size} bytes) exceeds memory limit ({} bytes)",
                    self.max_memory_bytes
                ),
            ));
        }

        let mut inner = self.inner.lock();
        let writes = inner.remove(name).map_or(0, |e| e.writes) + 1;
        let evicted = inner.make_room(size, self.max_keys, self.max_memory_bytes);
        if evicted > 0 {
            tracing::debug!(evicted, keys = inner.entries.len(), "evicted from memory sink");
        }

        let order = inner.next_order;
        inner.next_order += 1;
        inner.total_bytes += size;
        inner.order_index.insert(order, name.to_string());
        inner.entries.insert(
            name.to_string(),
            Entry {
                data,
                order,
                written_at: Instant::now(),
                writes,
            },
        );
        tracing::trace!(name, size, "stored in memory");
        Ok(())
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        let Some(cutoff) = Instant::now().checked_sub(older_than) else {
            return Ok(0);
        };
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(name, entry)| name.ends_with(".ts") && entry.written_at < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            inner.remove(name);
        }
        Ok(expired.len())
    }
}
