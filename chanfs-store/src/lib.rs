// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage layer for chanfs
//!
//! Moves file content through a message backend in bounded chunks and
//! keeps the namespace snapshot in a backend slot. Both go through the
//! same retry policy.

pub mod retry;
pub mod snapshot;
pub mod transport;

pub use retry::{RetryError, RetryPolicy};
pub use snapshot::{MetadataStore, Snapshot, SnapshotDirectory, SnapshotFile, SNAPSHOT_FORMAT};
pub use transport::{split_chunks, ChunkedTransport};
