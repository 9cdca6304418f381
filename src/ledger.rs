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

//! Customer ledger.
//!
//! The [`CustomerLedger`] owns every customer's point balance and history.
//! Each customer row sits behind its own [`Mutex`]; the balance update and the
//! history append happen inside one critical section, so readers either see
//! both or neither.
//!
//! # Example
//!
//! ```
//! use loyalty_ledger::{CustomerId, CustomerLedger, EntryKind};
//! use rust_decimal_macros::dec;
//!
//! let ledger = CustomerLedger::new();
//! let alice = CustomerId::from("alice");
//! ledger.create(&alice, "Alice").unwrap();
//!
//! let entry = ledger.apply_delta(&alice, dec!(2), EntryKind::Accrual).unwrap();
//! assert_eq!(entry.balance_after, dec!(2));
//! assert_eq!(ledger.get_balance(&alice).unwrap(), dec!(2));
//! ```

use crate::base::{CustomerId, EntryId};
use crate::customer::{Customer, EntryKind, HistoryEntry};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::try_result::TryResult;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct AccountData {
    customer_id: CustomerId,
    display_name: String,
    balance: Decimal,
    opening_balance: Decimal,
    created_at: DateTime<Utc>,
    /// Append-only; entries are never updated or removed.
    history: Vec<HistoryEntry>,
}

impl AccountData {
    fn new(customer_id: CustomerId, display_name: String, opening_balance: Decimal) -> Self {
        Self {
            customer_id,
            display_name,
            balance: opening_balance,
            opening_balance,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert_eq!(
            self.opening_balance + self.history.iter().map(|e| e.delta).sum::<Decimal>(),
            self.balance,
            "Invariant violated: history does not reconcile with balance"
        );
    }

    /// Computes the balance `delta` would produce, without mutating.
    fn checked_balance(&self, delta: Decimal, kind: EntryKind) -> Result<Decimal, LedgerError> {
        if !kind.accepts(delta) {
            return Err(LedgerError::InvalidDelta);
        }
        let new_balance = self
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::InvalidDelta)?;
        if kind == EntryKind::Redemption && new_balance < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance);
        }
        Ok(new_balance)
    }

    /// Applies `delta` and appends the matching history entry.
    fn apply(
        &mut self,
        id: impl FnOnce() -> EntryId,
        delta: Decimal,
        kind: EntryKind,
    ) -> Result<HistoryEntry, LedgerError> {
        let new_balance = self.checked_balance(delta, kind)?;
        let entry = HistoryEntry {
            id: id(),
            customer_id: self.customer_id.clone(),
            delta,
            kind,
            balance_after: new_balance,
            timestamp: Utc::now(),
        };
        self.balance = new_balance;
        self.history.push(entry.clone());
        self.assert_invariants();
        Ok(entry)
    }

    fn snapshot(&self) -> Customer {
        Customer {
            id: self.customer_id.clone(),
            display_name: self.display_name.clone(),
            balance: self.balance,
            opening_balance: self.opening_balance,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug)]
struct Account {
    inner: Mutex<AccountData>,
}

impl Account {
    fn new(data: AccountData) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    fn lock_within(&self, timeout: Duration) -> Result<MutexGuard<'_, AccountData>, LedgerError> {
        self.inner
            .try_lock_for(timeout)
            .ok_or(LedgerError::Timeout)
    }
}

/// Balances and history for every registered customer.
///
/// # Invariants
///
/// - A balance never goes negative through a redemption.
/// - `balance == opening_balance + sum(history deltas)` for every customer.
/// - Mutations of one customer are serialized; different customers never
///   share a lock.
#[derive(Debug)]
pub struct CustomerLedger {
    /// Customer rows indexed by external identity.
    accounts: DashMap<CustomerId, Arc<Account>>,
    next_entry_id: AtomicU64,
    lock_timeout: Duration,
}

impl CustomerLedger {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a ledger whose per-customer lock waits give up after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            next_entry_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Registers a customer with a zero balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyExists`] if the identity is taken; the existing
    /// row is left untouched.
    pub fn create(
        &self,
        customer_id: &CustomerId,
        display_name: &str,
    ) -> Result<Customer, LedgerError> {
        self.create_with_balance(customer_id, display_name, Decimal::ZERO)
    }

    /// Registers a customer with a non-negative opening balance.
    pub fn create_with_balance(
        &self,
        customer_id: &CustomerId,
        display_name: &str,
        opening_balance: Decimal,
    ) -> Result<Customer, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidDelta);
        }
        let customer = self.bounded(|| {
            self.accounts
                .try_entry(customer_id.clone())
                .map(|entry| match entry {
                    Entry::Occupied(_) => Err(LedgerError::AlreadyExists),
                    Entry::Vacant(vacant) => {
                        let data = AccountData::new(
                            customer_id.clone(),
                            display_name.to_string(),
                            opening_balance,
                        );
                        let customer = data.snapshot();
                        vacant.insert(Arc::new(Account::new(data)));
                        Ok(customer)
                    }
                })
        })??;
        info!(customer = %customer_id, balance = %opening_balance, "customer registered");
        Ok(customer)
    }

    pub fn get_balance(&self, customer_id: &CustomerId) -> Result<Decimal, LedgerError> {
        let account = self.account(customer_id)?;
        let data = account.lock_within(self.lock_timeout)?;
        Ok(data.balance)
    }

    pub fn customer(&self, customer_id: &CustomerId) -> Result<Customer, LedgerError> {
        let account = self.account(customer_id)?;
        let data = account.lock_within(self.lock_timeout)?;
        Ok(data.snapshot())
    }

    /// Applies a signed delta and appends one history entry.
    ///
    /// Accruals take a positive delta, redemptions a negative one. The
    /// returned entry carries the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - No such customer.
    /// - [`LedgerError::InvalidDelta`] - Delta sign does not match `kind`.
    /// - [`LedgerError::InsufficientBalance`] - Redemption exceeds the balance;
    ///   the balance is unchanged.
    /// - [`LedgerError::Timeout`] - The customer's lock stayed busy too long.
    pub fn apply_delta(
        &self,
        customer_id: &CustomerId,
        delta: Decimal,
        kind: EntryKind,
    ) -> Result<HistoryEntry, LedgerError> {
        let result = self.apply_locked(customer_id, delta, kind);
        match &result {
            Ok(entry) => info!(
                customer = %customer_id,
                entry = %entry.id,
                delta = %delta,
                balance = %entry.balance_after,
                "{kind} applied"
            ),
            Err(e) => info!(
                customer = %customer_id,
                delta = %delta,
                reason = %e,
                "{kind} rejected"
            ),
        }
        result
    }

    fn apply_locked(
        &self,
        customer_id: &CustomerId,
        delta: Decimal,
        kind: EntryKind,
    ) -> Result<HistoryEntry, LedgerError> {
        if !kind.accepts(delta) {
            return Err(LedgerError::InvalidDelta);
        }
        let account = self.account(customer_id)?;
        let mut data = account.lock_within(self.lock_timeout)?;
        data.apply(
            || EntryId(self.next_entry_id.fetch_add(1, Ordering::SeqCst)),
            delta,
            kind,
        )
    }

    /// History of one customer in commit order.
    pub fn history(&self, customer_id: &CustomerId) -> Result<Vec<HistoryEntry>, LedgerError> {
        let account = self.account(customer_id)?;
        let data = account.lock_within(self.lock_timeout)?;
        Ok(data.history.clone())
    }

    /// Snapshot of every customer, ordered by identity.
    pub fn customers(&self) -> Result<Vec<Customer>, LedgerError> {
        let mut customers = self
            .all_accounts()
            .iter()
            .map(|account| Ok(account.lock_within(self.lock_timeout)?.snapshot()))
            .collect::<Result<Vec<_>, LedgerError>>()?;
        customers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(customers)
    }

    /// The whole history table, ordered by entry id.
    pub fn all_history(&self) -> Result<Vec<HistoryEntry>, LedgerError> {
        let mut entries = Vec::new();
        for account in self.all_accounts() {
            let data = account.lock_within(self.lock_timeout)?;
            entries.extend(data.history.iter().cloned());
        }
        entries.sort_by_key(|entry| entry.id);
        debug!(entries = entries.len(), "history collected");
        Ok(entries)
    }

    pub fn contains(&self, customer_id: &CustomerId) -> Result<bool, LedgerError> {
        match self.account(customer_id) {
            Ok(_) => Ok(true),
            Err(LedgerError::CustomerNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Clones the row handle so the map shard is released before the row
    /// lock is taken.
    fn account(&self, customer_id: &CustomerId) -> Result<Arc<Account>, LedgerError> {
        self.bounded(|| match self.accounts.try_get(customer_id) {
            TryResult::Present(account) => Some(Ok(Arc::clone(account.value()))),
            TryResult::Absent => Some(Err(LedgerError::CustomerNotFound)),
            TryResult::Locked => None,
        })?
    }

    /// Retries `attempt` while the map shard is locked, up to the lock timeout.
    fn bounded<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> Result<T, LedgerError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if let Some(value) = attempt() {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(LedgerError::Timeout);
            }
            std::thread::yield_now();
        }
    }

    /// Row handles of every customer. Listing views wait for each shard in
    /// turn; only the row locks are bounded.
    fn all_accounts(&self) -> Vec<Arc<Account>> {
        self.accounts
            .iter()
            .map(|account| Arc::clone(account.value()))
            .collect()
    }
}

impl Default for CustomerLedger {
    fn default() -> Self {
        Self::new()
    }
}
