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

//! Redemption coordinator.
//!
//! The [`Coordinator`] is the boundary the bot and HTTP layers talk to. It
//! issues codes, registers customers, credits purchases and runs every
//! redemption attempt through the same state machine:
//!
//! ```text
//! Received ──take──► CodeValidated ──apply_delta──► DeltaApplied ──► Completed
//!    │                   │
//!    │                   ├─► CodeInvalid
//!    │                   ├─► CustomerNotFound
//!    │                   └─► LedgerRejected
//!    └─► LedgerRejected (zero delta)
//! ```
//!
//! A code is consumed before the ledger is consulted, so it stays consumed
//! even when the ledger rejects the delta. The coordinator never retries a
//! redemption; callers decide whether to ask for a new code.

use crate::base::{Code, CustomerId, EntryId};
use crate::catalog::{Reward, RewardCatalog};
use crate::code::CodeGenerator;
use crate::code_store::{CodeStore, PendingCode};
use crate::customer::{Customer, EntryKind, HistoryEntry};
use crate::error::{CodeStoreError, IssueError, LedgerError, RedemptionError};
use crate::ledger::CustomerLedger;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of a single redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionStage {
    Received,
    CodeValidated,
    DeltaApplied,
    Completed,
}

impl fmt::Display for RedemptionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::CodeValidated => "code_validated",
            Self::DeltaApplied => "delta_applied",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// A freshly issued code, as surfaced to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCode {
    pub code: Code,
    pub customer_id: CustomerId,
    pub reward: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&PendingCode> for IssuedCode {
    fn from(pending: &PendingCode) -> Self {
        Self {
            code: pending.code.clone(),
            customer_id: pending.customer_id.clone(),
            reward: pending.reward.clone(),
            issued_at: pending.created_at,
            expires_at: pending.expires_at,
        }
    }
}

/// Result of a completed redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub customer_id: CustomerId,
    pub new_balance: Decimal,
    pub entry_id: EntryId,
}

/// Outcome of [`Coordinator::register_customer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(Customer),
    Existing(Customer),
}

impl Registration {
    pub fn customer(&self) -> &Customer {
        match self {
            Self::Created(customer) | Self::Existing(customer) => customer,
        }
    }

    pub fn into_customer(self) -> Customer {
        match self {
            Self::Created(customer) | Self::Existing(customer) => customer,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Tunables of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Lifetime of an issued code; `None` never expires.
    pub code_ttl: Option<TimeDelta>,
    /// How many fresh codes the issuing path tries before giving up.
    pub max_issue_attempts: u32,
    /// Points credited by [`Coordinator::record_purchase`].
    pub points_per_purchase: Decimal,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            code_ttl: Some(TimeDelta::minutes(15)),
            max_issue_attempts: 8,
            points_per_purchase: Decimal::TWO,
        }
    }
}

pub struct Coordinator {
    ledger: CustomerLedger,
    codes: Arc<dyn CodeStore>,
    generator: Arc<dyn CodeGenerator>,
    catalog: Arc<RewardCatalog>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        ledger: CustomerLedger,
        codes: Arc<dyn CodeStore>,
        generator: Arc<dyn CodeGenerator>,
        catalog: Arc<RewardCatalog>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            ledger,
            codes,
            generator,
            catalog,
            settings,
        }
    }

    // === Customers ===

    /// Registers a customer, or returns the existing row untouched.
    pub fn register_customer(
        &self,
        customer_id: &CustomerId,
        display_name: &str,
    ) -> Result<Registration, LedgerError> {
        match self.ledger.create(customer_id, display_name) {
            Ok(customer) => Ok(Registration::Created(customer)),
            Err(LedgerError::AlreadyExists) => {
                debug!(customer = %customer_id, "customer already registered");
                Ok(Registration::Existing(self.ledger.customer(customer_id)?))
            }
            Err(e) => Err(e),
        }
    }

    /// Registers a customer carried over from another system with its balance.
    pub fn import_customer(
        &self,
        customer_id: &CustomerId,
        display_name: &str,
        opening_balance: Decimal,
    ) -> Result<Customer, LedgerError> {
        self.ledger
            .create_with_balance(customer_id, display_name, opening_balance)
    }

    pub fn get_balance(&self, customer_id: &CustomerId) -> Result<Decimal, LedgerError> {
        self.ledger.get_balance(customer_id)
    }

    pub fn customer(&self, customer_id: &CustomerId) -> Result<Customer, LedgerError> {
        self.ledger.customer(customer_id)
    }

    pub fn customers(&self) -> Result<Vec<Customer>, LedgerError> {
        self.ledger.customers()
    }

    pub fn history(&self, customer_id: &CustomerId) -> Result<Vec<HistoryEntry>, LedgerError> {
        self.ledger.history(customer_id)
    }

    pub fn all_history(&self) -> Result<Vec<HistoryEntry>, LedgerError> {
        self.ledger.all_history()
    }

    /// Credits the configured per-purchase points.
    pub fn record_purchase(&self, customer_id: &CustomerId) -> Result<HistoryEntry, LedgerError> {
        self.ledger
            .apply_delta(customer_id, self.settings.points_per_purchase, EntryKind::Accrual)
    }

    // === Rewards ===

    pub fn catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    pub fn affordable_rewards(&self, customer_id: &CustomerId) -> Result<Vec<Reward>, LedgerError> {
        let balance = self.ledger.get_balance(customer_id)?;
        Ok(self.catalog.affordable(balance))
    }

    // === Codes ===

    /// Issues a code bound to `customer_id`.
    ///
    /// # Errors
    ///
    /// - [`IssueError::CustomerNotFound`] - No such customer.
    /// - [`IssueError::Exhausted`] - Every attempt collided with a pending code.
    /// - [`IssueError::Timeout`] - The code store stayed busy too long.
    pub fn issue_code(&self, customer_id: &CustomerId) -> Result<IssuedCode, IssueError> {
        self.issue(customer_id, None)
    }

    /// Issues a code earmarked for `reward`.
    pub fn issue_reward_code(
        &self,
        customer_id: &CustomerId,
        reward: &str,
    ) -> Result<IssuedCode, IssueError> {
        if self.catalog.cost(reward).is_none() {
            return Err(IssueError::UnknownReward(reward.to_string()));
        }
        self.issue(customer_id, Some(reward))
    }

    fn issue(&self, customer_id: &CustomerId, reward: Option<&str>) -> Result<IssuedCode, IssueError> {
        match self.ledger.contains(customer_id) {
            Ok(true) => {}
            Ok(false) => return Err(IssueError::CustomerNotFound),
            Err(_) => return Err(IssueError::Timeout),
        }

        for attempt in 1..=self.settings.max_issue_attempts {
            let mut pending = PendingCode::new(
                self.generator.issue(),
                customer_id.clone(),
                Utc::now(),
                self.settings.code_ttl,
            );
            if let Some(reward) = reward {
                pending = pending.with_reward(reward);
            }
            let issued = IssuedCode::from(&pending);

            match self.codes.put(pending) {
                Ok(()) => {
                    info!(customer = %customer_id, code = %issued.code, "code issued");
                    return Ok(issued);
                }
                Err(CodeStoreError::Timeout) => return Err(IssueError::Timeout),
                Err(e) => debug!(attempt, reason = %e, "code rejected by store, retrying"),
            }
        }

        warn!(
            customer = %customer_id,
            attempts = self.settings.max_issue_attempts,
            "could not find a free code"
        );
        Err(IssueError::Exhausted(self.settings.max_issue_attempts))
    }

    /// Drops expired codes; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.codes.purge_expired();
        if removed > 0 {
            debug!(removed, "expired codes swept");
        }
        removed
    }

    pub fn pending_codes(&self) -> usize {
        self.codes.len()
    }

    // === Redemption ===

    /// Consumes `code` and applies `delta` to the customer it is bound to.
    ///
    /// Negative deltas are redemptions, positive deltas accruals. Only plain
    /// codes are accepted; a code issued for a reward is consumed and
    /// rejected, see [`Coordinator::redeem_reward`].
    ///
    /// # Errors
    ///
    /// - [`RedemptionError::CodeInvalid`] - Unknown, used, expired or reward code.
    /// - [`RedemptionError::CustomerNotFound`] - The bound customer is gone.
    /// - [`RedemptionError::LedgerRejected`] - Zero delta or insufficient balance.
    /// - [`RedemptionError::Timeout`] - Code store or ledger stayed busy too long.
    pub fn redeem_code(&self, code: &Code, delta: Decimal) -> Result<Redemption, RedemptionError> {
        self.redeem(code, delta, None)
    }

    /// Redeems `code` for a catalog reward, debiting its cost.
    ///
    /// Plain codes may pay for any reward. A code issued for a different
    /// reward is consumed and reported as [`RedemptionError::CodeInvalid`].
    pub fn redeem_reward(&self, code: &Code, reward: &str) -> Result<Redemption, RedemptionError> {
        let cost = self
            .catalog
            .cost(reward)
            .ok_or_else(|| RedemptionError::UnknownReward(reward.to_string()))?;
        self.redeem(code, -cost, Some(reward))
    }

    fn redeem(
        &self,
        code: &Code,
        delta: Decimal,
        reward: Option<&str>,
    ) -> Result<Redemption, RedemptionError> {
        let mut stage = RedemptionStage::Received;
        let result = self.advance(code, delta, reward, &mut stage);
        match &result {
            Ok(redemption) => info!(
                customer = %redemption.customer_id,
                delta = %delta,
                balance = %redemption.new_balance,
                "redemption completed"
            ),
            Err(e) => info!(delta = %delta, stage = %stage, reason = %e, "redemption failed"),
        }
        result
    }

    fn advance(
        &self,
        code: &Code,
        delta: Decimal,
        reward: Option<&str>,
        stage: &mut RedemptionStage,
    ) -> Result<Redemption, RedemptionError> {
        // Rejected before the code is touched so it stays usable
        let kind = EntryKind::for_delta(delta)
            .ok_or(RedemptionError::LedgerRejected(LedgerError::InvalidDelta))?;

        let pending = self.codes.take(code).map_err(|e| match e {
            CodeStoreError::Timeout => RedemptionError::Timeout,
            CodeStoreError::NotFound | CodeStoreError::Collision => RedemptionError::CodeInvalid,
        })?;
        *stage = RedemptionStage::CodeValidated;
        debug!(customer = %pending.customer_id, stage = %stage, "code consumed");

        // A reward code only pays for the reward it was issued for
        if let Some(bound) = pending.reward.as_deref() {
            if reward != Some(bound) {
                return Err(RedemptionError::CodeInvalid);
            }
        }

        let entry = self.ledger.apply_delta(&pending.customer_id, delta, kind)?;
        *stage = RedemptionStage::DeltaApplied;
        debug!(customer = %pending.customer_id, entry = %entry.id, stage = %stage);

        *stage = RedemptionStage::Completed;
        Ok(Redemption {
            customer_id: pending.customer_id,
            new_balance: entry.balance_after,
            entry_id: entry.id,
        })
    }
}
