//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be in-memory or a database backend.

use crate::error::StoreError;
use async_trait::async_trait;
use treasury_domain::{Treasury, TreasuryEvent, TreasuryId};

/// Repository for Treasury state
#[async_trait]
pub trait TreasuryRepository: Send + Sync {
    /// Save a treasury (insert or update)
    async fn save(&self, treasury: &Treasury) -> Result<(), StoreError>;

    /// Insert a treasury that must not exist yet
    async fn insert(&self, treasury: &Treasury) -> Result<(), StoreError>;

    /// Find a treasury by ID
    async fn find_by_id(&self, id: TreasuryId) -> Result<Option<Treasury>, StoreError>;

    /// All treasuries that have been initialized
    async fn find_active(&self) -> Result<Vec<Treasury>, StoreError>;
}

/// A persisted event with its log position
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredEvent {
    /// Monotonic sequence number across the whole log
    pub seq: i64,
    /// The event
    pub event: TreasuryEvent,
}

/// Repository for treasury events (append-only)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event to the log
    async fn append(&self, event: &TreasuryEvent) -> Result<i64, StoreError>;

    /// Load all events for a treasury (in order)
    async fn find_by_treasury(&self, treasury_id: TreasuryId) -> Result<Vec<StoredEvent>, StoreError>;

    /// Load events for a treasury after a given sequence number
    async fn find_by_treasury_after(
        &self,
        treasury_id: TreasuryId,
        after_seq: i64,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Get the latest event sequence number for a treasury
    async fn get_latest_seq(&self, treasury_id: TreasuryId) -> Result<Option<i64>, StoreError>;
}

/// Combined store interface
#[async_trait]
pub trait Store: Send + Sync {
    /// Get treasury repository
    fn treasuries(&self) -> &dyn TreasuryRepository;

    /// Get event repository
    fn events(&self) -> &dyn EventRepository;

    /// Begin a transaction (for implementations that support it)
    async fn begin_transaction(&self) -> Result<(), StoreError> {
        Ok(()) // Default no-op for non-transactional stores
    }

    /// Commit the current transaction
    async fn commit(&self) -> Result<(), StoreError> {
        Ok(()) // Default no-op
    }

    /// Rollback the current transaction
    async fn rollback(&self) -> Result<(), StoreError> {
        Ok(()) // Default no-op
    }
}
