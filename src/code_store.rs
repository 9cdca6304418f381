// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ephemeral store of pending redemption codes.
//!
//! A pending code binds a short code to a customer until it is consumed or
//! expires. [`CodeStore::take`] reads and removes the entry in a single
//! critical section, which is what makes a code single-use: of any number of
//! concurrent `take` calls for one code, exactly one observes the entry.
//!
//! Expired entries that have not been swept yet are invisible: `take`
//! reports them as [`CodeStoreError::NotFound`] and `put` may reuse their
//! code.

use crate::base::{Code, CustomerId};
use crate::error::CodeStoreError;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A code waiting to be redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCode {
    pub code: Code,
    pub customer_id: CustomerId,
    /// Reward the code was issued for, if any.
    pub reward: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `None` means the code never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingCode {
    pub fn new(
        code: Code,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        ttl: Option<TimeDelta>,
    ) -> Self {
        Self {
            code,
            customer_id,
            reward: None,
            created_at,
            expires_at: ttl.and_then(|ttl| created_at.checked_add_signed(ttl)),
        }
    }

    pub fn with_reward(mut self, reward: impl Into<String>) -> Self {
        self.reward = Some(reward.into());
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Storage for pending codes.
///
/// Implementations must make every operation atomic per code and must give
/// up with [`CodeStoreError::Timeout`] rather than block indefinitely.
pub trait CodeStore: Send + Sync {
    /// Registers a pending code.
    ///
    /// # Errors
    ///
    /// [`CodeStoreError::Collision`] if the code is already pending.
    fn put(&self, pending: PendingCode) -> Result<(), CodeStoreError>;

    /// Atomically removes and returns the pending entry for `code`.
    ///
    /// # Errors
    ///
    /// [`CodeStoreError::NotFound`] for unknown, consumed and expired codes.
    fn take(&self, code: &Code) -> Result<PendingCode, CodeStoreError>;

    /// Removes `code` if it is past its expiry. Returns whether it was removed.
    fn expire(&self, code: &Code) -> Result<bool, CodeStoreError>;

    /// Removes every expired entry and returns how many were dropped.
    ///
    /// A sweep visits the whole store and may wait on concurrent per-code
    /// operations, which only hold their locks for an in-memory check.
    fn purge_expired(&self) -> usize;

    /// Number of entries held, including expired ones not swept yet.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process [`CodeStore`] backed by a [`DashMap`].
///
/// Each operation works on a single map entry through the entry API, so the
/// shard lock is held only for that entry's check-and-mutate. Shard locks are
/// acquired with `try_entry` and retried until the operation budget runs out.
#[derive(Debug)]
pub struct MemoryCodeStore {
    codes: DashMap<Code, PendingCode>,
    op_timeout: Duration,
}

impl MemoryCodeStore {
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_OP_TIMEOUT)
    }

    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            op_timeout,
        }
    }

    /// Retries `attempt` until it yields a value or the budget is spent.
    fn bounded<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> Result<T, CodeStoreError> {
        let deadline = Instant::now() + self.op_timeout;
        loop {
            if let Some(value) = attempt() {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(CodeStoreError::Timeout);
            }
            std::thread::yield_now();
        }
    }
}

impl Default for MemoryCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeStore for MemoryCodeStore {
    fn put(&self, pending: PendingCode) -> Result<(), CodeStoreError> {
        let now = Utc::now();
        self.bounded(|| {
            self.codes
                .try_entry(pending.code.clone())
                .map(|entry| match entry {
                    Entry::Occupied(mut occupied) => {
                        if occupied.get().is_expired_at(now) {
                            occupied.insert(pending.clone());
                            Ok(())
                        } else {
                            Err(CodeStoreError::Collision)
                        }
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(pending.clone());
                        Ok(())
                    }
                })
        })?
    }

    fn take(&self, code: &Code) -> Result<PendingCode, CodeStoreError> {
        let now = Utc::now();
        self.bounded(|| {
            self.codes.try_entry(code.clone()).map(|entry| match entry {
                Entry::Occupied(occupied) => {
                    // Removed either way: an expired code is gone for good.
                    let pending = occupied.remove();
                    if pending.is_expired_at(now) {
                        Err(CodeStoreError::NotFound)
                    } else {
                        Ok(pending)
                    }
                }
                Entry::Vacant(_) => Err(CodeStoreError::NotFound),
            })
        })?
    }

    fn expire(&self, code: &Code) -> Result<bool, CodeStoreError> {
        let now = Utc::now();
        self.bounded(|| {
            self.codes.try_entry(code.clone()).map(|entry| match entry {
                Entry::Occupied(occupied) if occupied.get().is_expired_at(now) => {
                    occupied.remove();
                    true
                }
                _ => false,
            })
        })
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.codes.retain(|_, pending| {
            let keep = !pending.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.codes.len()
    }
}
