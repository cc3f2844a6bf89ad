// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process message backend
//!
//! Keeps channels and slots in memory. Faults can be queued per operation
//! to exercise retry and failure paths.

use async_trait::async_trait;
use bytes::Bytes;
use chanfs_core::{ChanfsError, ChanfsResult, ContentLocator, MessageBackend};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::locator;

/// Default per-message limit (8 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Backend call kinds that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    Fetch,
    ReadSlot,
    WriteSlot,
}

/// Failure to produce instead of performing a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Network,
    RateLimited(Option<u64>),
    Timeout,
    /// A non-retryable backend error
    Fatal,
}

#[derive(Debug)]
struct FaultPlan {
    fault: Fault,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    channels: HashMap<String, Vec<Bytes>>,
    slots: HashMap<String, Bytes>,
    faults: HashMap<Operation, Vec<FaultPlan>>,
    calls: HashMap<Operation, u64>,
}

/// In-memory message backend
pub struct MemoryBackend {
    id: String,
    max_message_size: usize,
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Make the next `times` calls of `op` fail with `fault`.
    pub fn inject(&self, op: Operation, fault: Fault, times: u32) {
        if times == 0 {
            return;
        }
        self.state.lock().faults.entry(op).or_default().push(FaultPlan {
            fault,
            remaining: Some(times),
        });
    }

    /// Make every call of `op` fail with `fault` until cleared.
    pub fn fail_always(&self, op: Operation, fault: Fault) {
        self.state.lock().faults.entry(op).or_default().push(FaultPlan {
            fault,
            remaining: None,
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Number of calls made for `op`, failed ones included.
    pub fn calls(&self, op: Operation) -> u64 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Messages stored on `channel`, orphans included.
    pub fn message_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |messages| messages.len())
    }

    fn begin(&self, op: Operation) -> ChanfsResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        let Some(plans) = state.faults.get_mut(&op) else {
            return Ok(());
        };
        let Some(plan) = plans.first_mut() else {
            return Ok(());
        };
        let fault = plan.fault;
        if let Some(remaining) = plan.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                plans.remove(0);
            }
        }
        Err(self.fault_error(fault))
    }

    fn fault_error(&self, fault: Fault) -> ChanfsError {
        match fault {
            Fault::Network => ChanfsError::Network("injected connection reset".into()),
            Fault::RateLimited(retry_after_secs) => ChanfsError::RateLimited { retry_after_secs },
            Fault::Timeout => ChanfsError::Timeout,
            Fault::Fatal => ChanfsError::Backend {
                backend: self.id.clone(),
                message: "injected fatal error".into(),
            },
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl MessageBackend for MemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "In-memory channels"
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn send_chunk(&self, channel: &str, data: Bytes) -> ChanfsResult<ContentLocator> {
        // Let concurrent transfers interleave like real network calls.
        tokio::task::yield_now().await;
        self.begin(Operation::Send)?;

        if data.len() > self.max_message_size {
            return Err(ChanfsError::Backend {
                backend: self.id.clone(),
                message: format!(
                    "message of {} bytes exceeds limit of {}",
                    data.len(),
                    self.max_message_size
                ),
            });
        }

        let mut state = self.state.lock();
        let messages = state.channels.entry(channel.to_string()).or_default();
        messages.push(data);
        Ok(locator::encode(channel, messages.len() as u64))
    }

    async fn fetch_chunk(&self, locator: &ContentLocator) -> ChanfsResult<Bytes> {
        tokio::task::yield_now().await;
        self.begin(Operation::Fetch)?;

        let (channel, message_id) = locator::decode(&self.id, locator)?;
        let state = self.state.lock();
        message_id
            .checked_sub(1)
            .and_then(|index| state.channels.get(channel)?.get(index as usize))
            .cloned()
            .ok_or_else(|| ChanfsError::Backend {
                backend: self.id.clone(),
                message: format!("no message at {locator}"),
            })
    }

    async fn read_slot(&self, slot: &str) -> ChanfsResult<Option<Bytes>> {
        self.begin(Operation::ReadSlot)?;
        Ok(self.state.lock().slots.get(slot).cloned())
    }

    async fn write_slot(&self, slot: &str, data: Bytes) -> ChanfsResult<()> {
        self.begin(Operation::WriteSlot)?;
        self.state.lock().slots.insert(slot.to_string(), data);
        Ok(())
    }
}
