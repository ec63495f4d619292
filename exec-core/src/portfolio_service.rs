//! Portfolio Service: a read/write-lock-guarded, fixed-capacity LRU cache in
//! front of a [`PortfolioRepository`]. Repository calls happen with the
//! cache lock released.
//!
//! Eviction here is a proper least-recently-used policy rather than an
//! arbitrary map entry. Recency is tracked with an explicit
//! `VecDeque<String>` rather than reaching for an external `lru` crate,
//! keeping the eviction policy as visible as the sharding in
//! `execution.rs`.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::portfolio::Portfolio;
use crate::ports::PortfolioRepository;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Maximum number of portfolios held in the cache at once. Eviction
    /// drops the least-recently-used entry once this is exceeded.
    pub cache_capacity: usize,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self { cache_capacity: 1_000 }
    }
}

/// Recency-ordered cache body, guarded by a single lock. `order` holds ids
/// from least- to most-recently-used; an id can appear only once.
struct Lru {
    entries: HashMap<String, Portfolio>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn touch(&mut self, id: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == id) {
            self.order.remove(pos);
        }
        self.order.push_back(id.to_string());
    }

    fn get(&mut self, id: &str) -> Option<Portfolio> {
        let hit = self.entries.get(id).cloned();
        if hit.is_some() {
            self.touch(id);
        }
        hit
    }

    fn put(&mut self, portfolio: Portfolio) {
        let id = portfolio.id.clone();
        self.entries.insert(id.clone(), portfolio);
        self.touch(&id);
        while self.entries.len() > self.capacity {
            if let Some(lru_id) = self.order.pop_front() {
                self.entries.remove(&lru_id);
            } else {
                break;
            }
        }
    }

    fn remove(&mut self, id: &str) {
        self.entries.remove(id);
        if let Some(pos) = self.order.iter().position(|k| k == id) {
            self.order.remove(pos);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Wraps a [`PortfolioRepository`] with a recency-ordered cache. Cache hits
/// avoid the repository entirely; misses fall through to the repository
/// with the cache lock released for the duration of the repository call.
pub struct PortfolioService<R: PortfolioRepository> {
    repository: std::sync::Arc<R>,
    cache: RwLock<Lru>,
}

impl<R: PortfolioRepository> PortfolioService<R> {
    pub fn new(repository: std::sync::Arc<R>, config: PortfolioConfig) -> Self {
        Self {
            repository,
            cache: RwLock::new(Lru::new(config.cache_capacity)),
        }
    }

    /// Fetch a portfolio, preferring the cache. On a miss, loads from the
    /// repository and populates the cache with the result (including a
    /// negative lookup being left uncached, since `None` carries no state
    /// worth caching).
    pub fn get(&self, id: &str) -> CoreResult<Option<Portfolio>> {
        if let Some(hit) = self.cache.write().get(id) {
            return Ok(Some(hit));
        }
        let loaded = self.repository.find_by_id(id)?;
        if let Some(portfolio) = &loaded {
            self.cache.write().put(portfolio.clone());
        }
        Ok(loaded)
    }

    /// Persist a portfolio to the repository, then refresh the cache entry.
    /// The repository call happens with the cache lock released.
    pub fn save(&self, portfolio: &Portfolio) -> CoreResult<()> {
        self.repository.save(portfolio)?;
        self.cache.write().put(portfolio.clone());
        Ok(())
    }

    pub fn invalidate(&self, id: &str) {
        self.cache.write().remove(id);
    }

    pub fn delete(&self, id: &str) -> CoreResult<()> {
        self.repository.delete(id)?;
        self.cache.write().remove(id);
        Ok(())
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Decimal;
    use crate::testing::InMemoryPortfolioRepository;

    fn portfolio(id: &str) -> Portfolio {
        Portfolio::new(id, "Test", Decimal::from_i64(1_000), 0).unwrap()
    }

    #[test]
    fn get_populates_cache_on_miss() {
        let repo = std::sync::Arc::new(InMemoryPortfolioRepository::new());
        repo.save(&portfolio("p1")).unwrap();
        let service = PortfolioService::new(repo, PortfolioConfig::default());

        assert_eq!(service.cached_len(), 0);
        let loaded = service.get("p1").unwrap();
        assert!(loaded.is_some());
        assert_eq!(service.cached_len(), 1);
    }

    #[test]
    fn save_refreshes_cache_without_separate_get() {
        let repo = std::sync::Arc::new(InMemoryPortfolioRepository::new());
        let service = PortfolioService::new(repo, PortfolioConfig::default());

        service.save(&portfolio("p1")).unwrap();
        assert_eq!(service.cached_len(), 1);
        assert_eq!(service.get("p1").unwrap().unwrap().id, "p1");
    }

    #[test]
    fn least_recently_used_entry_is_evicted_first() {
        let repo = std::sync::Arc::new(InMemoryPortfolioRepository::new());
        let config = PortfolioConfig { cache_capacity: 2 };
        let service = PortfolioService::new(repo, config);

        service.save(&portfolio("p1")).unwrap();
        service.save(&portfolio("p2")).unwrap();
        // touch p1 so p2 becomes least-recently-used
        service.get("p1").unwrap();
        service.save(&portfolio("p3")).unwrap();

        assert_eq!(service.cached_len(), 2);
        assert!(service.get("p1").unwrap().is_some());
        assert!(service.get("p3").unwrap().is_some());
    }

    #[test]
    fn invalidate_removes_entry_without_touching_repository() {
        let repo = std::sync::Arc::new(InMemoryPortfolioRepository::new());
        repo.save(&portfolio("p1")).unwrap();
        let service = PortfolioService::new(repo, PortfolioConfig::default());

        service.get("p1").unwrap();
        assert_eq!(service.cached_len(), 1);
        service.invalidate("p1");
        assert_eq!(service.cached_len(), 0);
        // repository entry is untouched, so a fresh get repopulates the cache
        assert!(service.get("p1").unwrap().is_some());
    }

    #[test]
    fn delete_removes_from_repository_and_cache() {
        let repo = std::sync::Arc::new(InMemoryPortfolioRepository::new());
        repo.save(&portfolio("p1")).unwrap();
        let service = PortfolioService::new(repo, PortfolioConfig::default());

        service.get("p1").unwrap();
        service.delete("p1").unwrap();
        assert_eq!(service.cached_len(), 0);
        assert!(service.get("p1").unwrap().is_none());
    }
}
