use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::ScrapeOutcome;
use crate::consts::MAX_CACHE_ENTRIES;

struct Entry {
    results_limit: usize,
    outcome: ScrapeOutcome,
    stored_at: Instant,
}

/// Time-bounded cache of scrape results keyed by username.
///
/// Usernames are compared case-insensitively. An entry only answers a
/// request for the same `results_limit` it was fetched with.
pub struct ScrapeCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ScrapeCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, MAX_CACHE_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("scrape cache lock poisoned"))
    }

    /// A fresh result for `username`, dropping it if it has expired.
    pub fn get(&self, username: &str, results_limit: usize) -> Result<Option<ScrapeOutcome>> {
        let key = username.to_lowercase();
        let mut entries = self.lock()?;
        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };
        if entry.stored_at.elapsed() >= self.ttl {
            entries.remove(&key);
            return Ok(None);
        }
        if entry.results_limit != results_limit {
            return Ok(None);
        }
        Ok(Some(entry.outcome.clone()))
    }

    /// Store `outcome`. Expired entries are purged first; when the cache is
    /// still full, the oldest entry makes room.
    pub fn put(&self, username: &str, results_limit: usize, outcome: ScrapeOutcome) -> Result<()> {
        let key = username.to_lowercase();
        let mut entries = self.lock()?;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(name, _)| name.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            Entry {
                results_limit,
                outcome,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, username: &str) -> Result<()> {
        self.lock()?.remove(&username.to_lowercase());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
