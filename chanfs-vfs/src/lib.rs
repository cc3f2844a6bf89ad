// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem operations for chanfs
//!
//! [`Filesystem`] composes the namespace, chunked transport and snapshot
//! store into the operations front ends call. [`dav`] adapts it to the
//! verbs a WebDAV server needs.

pub mod dav;
pub mod filesystem;

pub use dav::{ChanfsDav, DavFileSystem, DavStatus, DavWriteStream, ResourceType};
pub use filesystem::Filesystem;
