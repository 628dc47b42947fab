//! Epoch Treasury Storage Layer
//!
//! Provides persistence for treasury state and its event log.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Implementation for tests and the stub daemon
//!
//! # Usage
//!
//! ```rust
//! use treasury_store::{MemoryStore, Store};
//! use treasury_domain::{Principal, Treasury};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury-1"));
//!     store.treasuries().insert(&treasury).await.unwrap();
//!
//!     let found = store.treasuries().find_by_id(treasury.id).await.unwrap();
//!     assert!(found.is_some());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{EventRepository, Store, StoredEvent, TreasuryRepository};
