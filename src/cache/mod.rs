//! Content-addressed blob-directory cache shared across processes.
//!
//! This module provides the coordination layer the binary and server caches
//! are built on: a directory per key under a common root, advisory file
//! locks for cross-process reader/writer coordination, and a
//! validate-or-repopulate protocol that keeps partially built entries from
//! ever appearing valid.
//!
//! # Locking
//!
//! Locks live in a `.locks/` subdirectory of the cache root, one lockfile
//! per key plus a `.root` lockfile shared by every per-entry operation. The
//! lock order is fixed: root first (shared), then the key (shared for
//! readers, exclusive for populate and evict). Only root removal takes the
//! root lock exclusively.

mod engine;
mod lock;

pub use engine::{remove_root, DirCache, Lease, PopulateFn, ValidateFn};
pub use lock::{LockFile, DEFAULT_CREATE_RETRIES};
