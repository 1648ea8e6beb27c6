//! In-process store answering dynorm's store requests.
//!
//! [`MemoryStore`] keeps every table in memory, partitioned by hash key and
//! ordered by range key, and evaluates the key-condition, filter and update
//! expressions the connector emits. It pages results the way a remote store
//! does, so paging and provisioning logic can be exercised without a network.
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod expression;
pub mod state;
pub mod storage;
pub mod store;

pub use config::MemoryConfig;
pub use store::MemoryStore;
