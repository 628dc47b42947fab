//! In-memory store implementation
//!
//! Used for testing and the stub daemon.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::{EventRepository, Store, StoredEvent, TreasuryRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};
use treasury_domain::{Treasury, TreasuryEvent, TreasuryId};

/// In-memory store for testing
pub struct MemoryStore {
    treasuries: RwLock<HashMap<TreasuryId, Treasury>>,
    events: RwLock<Vec<StoredEvent>>,
    event_seq: AtomicI64,
}

fn poisoned<T>(err: PoisonError<T>) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {}", err))
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            treasuries: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            event_seq: AtomicI64::new(0),
        }
    }

    /// Get the number of treasuries
    pub fn treasury_count(&self) -> usize {
        self.treasuries.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Get the number of events
    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Treasury Repository Implementation
// =============================================================================

#[async_trait]
impl TreasuryRepository for MemoryStore {
    async fn save(&self, treasury: &Treasury) -> Result<(), StoreError> {
        let mut treasuries = self.treasuries.write().map_err(poisoned)?;
        treasuries.insert(treasury.id, treasury.clone());
        Ok(())
    }

    async fn insert(&self, treasury: &Treasury) -> Result<(), StoreError> {
        let mut treasuries = self.treasuries.write().map_err(poisoned)?;
        if treasuries.contains_key(&treasury.id) {
            return Err(StoreError::duplicate("treasury", treasury.id.to_string()));
        }
        treasuries.insert(treasury.id, treasury.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TreasuryId) -> Result<Option<Treasury>, StoreError> {
        let treasuries = self.treasuries.read().map_err(poisoned)?;
        Ok(treasuries.get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Treasury>, StoreError> {
        let treasuries = self.treasuries.read().map_err(poisoned)?;
        let mut active: Vec<Treasury> =
            treasuries.values().filter(|t| t.is_initialized()).cloned().collect();
        // v7 ids are time-ordered
        active.sort_by_key(|t| t.id);
        Ok(active)
    }
}

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, event: &TreasuryEvent) -> Result<i64, StoreError> {
        let mut events = self.events.write().map_err(poisoned)?;
        let seq = self.event_seq.fetch_add(1, Ordering::SeqCst) + 1;
        events.push(StoredEvent { seq, event: event.clone() });
        Ok(seq)
    }

    async fn find_by_treasury(&self, treasury_id: TreasuryId) -> Result<Vec<StoredEvent>, StoreError> {
        self.find_by_treasury_after(treasury_id, 0).await
    }

    async fn find_by_treasury_after(
        &self,
        treasury_id: TreasuryId,
        after_seq: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.event.treasury_id() == treasury_id && e.seq > after_seq)
            .cloned()
            .collect())
    }

    async fn get_latest_seq(&self, treasury_id: TreasuryId) -> Result<Option<i64>, StoreError> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.event.treasury_id() == treasury_id)
            .map(|e| e.seq)
            .max())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for MemoryStore {
    fn treasuries(&self) -> &dyn TreasuryRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
