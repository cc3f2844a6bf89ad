// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message backends for chanfs
//!
//! `memory` keeps everything in process and supports fault injection.
//! `sled` emulates a durable message store on a local database.

mod locator;
pub mod memory;

#[cfg(feature = "sled")]
pub mod sled_backend;

pub use memory::{Fault, MemoryBackend, Operation};

#[cfg(feature = "sled")]
pub use sled_backend::SledBackend;
