use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::keys::Key;
use crate::store::{Entity, Filter, Query, Store, StoreTransaction};

/// In-memory document store with per-document versioning and optimistic
/// multi-document transactions. Backs tests and local development; the
/// production deployment points the same [`Store`] contract at a hosted
/// document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: DashMap<Key, VersionedDoc>,
    /// Serializes commit-time version checks against writes.
    commit_lock: Mutex<()>,
    metrics: StoreMetrics,
}

#[derive(Debug, Clone)]
struct VersionedDoc {
    version: u64,
    doc: serde_json::Value,
}

/// Call counters, mostly useful to tests asserting batching behavior.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    gets: AtomicU64,
    batched_gets: AtomicU64,
    queries: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub gets: u64,
    pub batched_gets: u64,
    pub queries: u64,
    pub writes: u64,
    pub commits: u64,
    pub conflicts: u64,
}

impl StoreMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            batched_gets: self.batched_gets.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn decode(&self, key: &Key, doc: &VersionedDoc) -> AppResult<Entity> {
        let entity: Entity = serde_json::from_value(doc.doc.clone())?;
        if entity.key() != *key {
            return Err(AppError::Storage(format!(
                "document stored under {} decodes to {}",
                key,
                entity.key()
            )));
        }
        Ok(entity)
    }

    fn lookup(&self, key: &Key) -> AppResult<Option<(Entity, u64)>> {
        match self.docs.get(key) {
            Some(doc) => Ok(Some((self.decode(key, &doc)?, doc.version))),
            None => Ok(None),
        }
    }

    /// Writes a document, bumping its version. Callers hold the commit
    /// lock.
    fn apply_write(&self, entity: &Entity) -> AppResult<()> {
        let doc = serde_json::to_value(entity)?;
        let key = entity.key();
        let version = self.docs.get(&key).map(|d| d.version).unwrap_or(0) + 1;
        self.docs.insert(key, VersionedDoc { version, doc });
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn matches(entity: &Entity, filter: &Filter) -> bool {
        match (entity, filter) {
            (Entity::User(u), Filter::ContactsContain(k)) => u.contact_keys.contains(k),
            (Entity::Thread(t), Filter::MembersContain(k)) => t.has_user(k),
            (Entity::Event(e), Filter::MembersContain(k)) => e.has_user(k),
            (Entity::Message(m), Filter::AuthorIs(k)) => m.user_key == *k,
            (Entity::Message(m), Filter::ParentIs(k)) => m.parent.key() == *k,
            _ => false,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &Key) -> AppResult<Entity> {
        self.metrics.gets.fetch_add(1, Ordering::Relaxed);
        match self.lookup(key)? {
            Some((entity, _)) => Ok(entity),
            None => Err(AppError::NotFound(*key)),
        }
    }

    async fn get_multi(&self, keys: &[Key]) -> AppResult<Vec<Option<Entity>>> {
        self.metrics.batched_gets.fetch_add(1, Ordering::Relaxed);
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            result.push(self.lookup(key)?.map(|(entity, _)| entity));
        }
        Ok(result)
    }

    async fn put(&self, entity: &Entity) -> AppResult<()> {
        let _guard = self.commit_lock.lock().await;
        self.apply_write(entity)
    }

    async fn put_multi(&self, entities: &[Entity]) -> AppResult<()> {
        let _guard = self.commit_lock.lock().await;
        for entity in entities {
            self.apply_write(entity)?;
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> AppResult<Vec<Entity>> {
        self.metrics.queries.fetch_add(1, Ordering::Relaxed);
        let mut result = Vec::new();
        for item in self.docs.iter() {
            if item.key().kind != query.kind {
                continue;
            }
            let entity = self.decode(item.key(), item.value())?;
            if Self::matches(&entity, &query.filter) {
                result.push(entity);
            }
        }
        // Map iteration order is arbitrary; give callers a stable one.
        result.sort_by_key(|e| e.key().id);
        Ok(result)
    }

    async fn transaction<'a>(&'a self) -> AppResult<Box<dyn StoreTransaction + 'a>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            read_versions: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

/// Optimistic transaction over [`MemoryStore`]. Reads pin the version they
/// observed (or the document's absence); commit re-validates every pin
/// under the commit lock before applying the staged writes.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    read_versions: HashMap<Key, Option<u64>>,
    writes: Vec<Entity>,
}

impl MemoryTransaction<'_> {
    fn pin(&mut self, key: Key, version: Option<u64>) {
        // The first observation wins; later reads of the same key must not
        // loosen the check.
        self.read_versions.entry(key).or_insert(version);
    }

    fn staged(&self, key: &Key) -> Option<&Entity> {
        self.writes.iter().find(|e| e.key() == *key)
    }

    fn lookup(&mut self, key: &Key) -> AppResult<Option<Entity>> {
        if self.staged(key).is_some() {
            return Ok(self.staged(key).cloned());
        }
        let found = self.store.lookup(key)?;
        self.pin(*key, found.as_ref().map(|(_, version)| *version));
        Ok(found.map(|(entity, _)| entity))
    }
}

#[async_trait]
impl<'s> StoreTransaction for MemoryTransaction<'s> {
    async fn get(&mut self, key: &Key) -> AppResult<Entity> {
        match self.lookup(key)? {
            Some(entity) => Ok(entity),
            None => Err(AppError::NotFound(*key)),
        }
    }

    async fn get_multi(&mut self, keys: &[Key]) -> AppResult<Vec<Option<Entity>>> {
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            result.push(self.lookup(key)?);
        }
        Ok(result)
    }

    fn put(&mut self, entity: Entity) {
        if let Some(i) = self.writes.iter().position(|e| e.key() == entity.key()) {
            self.writes[i] = entity;
        } else {
            self.writes.push(entity);
        }
    }

    fn put_multi(&mut self, entities: Vec<Entity>) {
        for entity in entities {
            self.put(entity);
        }
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let store = self.store;
        let _guard = store.commit_lock.lock().await;

        for (key, pinned) in &self.read_versions {
            let current = store.docs.get(key).map(|d| d.version);
            if current != *pinned {
                store.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                return Err(AppError::TransactionConflict);
            }
        }

        for entity in &self.writes {
            store.apply_write(entity)?;
        }
        store.metrics.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
