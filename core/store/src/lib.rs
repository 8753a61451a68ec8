//! Local record store for CareSync.
//!
//! SQLite-backed persistence for syncable records: one table per registered
//! entity type (id, owner, synced flag, JSON payload), a tombstone table for
//! pending deletions, and a small metadata table.
//!
//! # Design Principles
//! - The store owns the canonical local copy of every record
//! - Single-record upsert/update is atomic; no multi-record transactions
//!   span a sync pass
//! - All operations are synchronous and fast relative to a sync run

pub mod store;

pub use store::RecordStore;
