//! # Sprawl Store
//!
//! Storage abstraction for Sprawl. Provides a trait-based interface over an
//! ordered, byte-keyed store with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The projection services keep orders, channels, and the node identity
//! behind the [`Storage`] trait, so they are agnostic to the backend. The
//! persistent implementation is [`SqliteStore`], with [`MemoryStore`] for
//! tests and ephemeral nodes.
//!
//! ## Key Types
//!
//! - [`Storage`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sprawl_store::{SqliteStore, Storage};
//!
//! async fn example() {
//!     let store = SqliteStore::open("sprawl.db").unwrap();
//!
//!     store.put(b"channel.BTC,ETH", b"...").await.unwrap();
//!     let channels = store.get_all_with_prefix(b"channel.").await.unwrap();
//!     assert_eq!(channels.len(), 1);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Ordered scans**: prefix scans return entries in ascending key order
//! - **Opaque bytes**: keys and values are never interpreted by the store
//! - **Blind writes**: `put` overwrites, `delete` of a missing key succeeds

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Entry, Storage};
