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

//! Error types for code issuance, code storage, the ledger and redemptions.
//!
//! None of these are fatal: every variant is an expected outcome that the
//! caller branches on.

use thiserror::Error;

/// Ephemeral code store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeStoreError {
    /// The code is already pending; retry with a fresh code
    #[error("code is already pending")]
    Collision,

    /// The code is unknown, already consumed or expired
    #[error("code not found")]
    NotFound,

    /// The store did not complete the operation within its time budget
    #[error("code store operation timed out")]
    Timeout,
}

/// Customer ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No customer is registered under the given identity
    #[error("customer not found")]
    CustomerNotFound,

    /// Redemption would drive the balance negative
    #[error("insufficient point balance")]
    InsufficientBalance,

    /// Delta sign does not match the entry kind, or the amount is negative
    #[error("invalid delta for entry kind")]
    InvalidDelta,

    /// A customer with the same identity is already registered
    #[error("customer already exists")]
    AlreadyExists,

    /// The per-customer lock could not be acquired within the time budget
    #[error("ledger operation timed out")]
    Timeout,
}

/// Outcomes of a failed redemption attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedemptionError {
    /// Unknown, already used and expired codes all map here
    #[error("invalid code")]
    CodeInvalid,

    /// The code was bound to a customer the ledger does not know
    #[error("customer not found")]
    CustomerNotFound,

    /// The ledger refused the delta
    #[error("ledger rejected the delta: {0}")]
    LedgerRejected(LedgerError),

    /// Reward name is not part of the catalog
    #[error("unknown reward '{0}'")]
    UnknownReward(String),

    /// A storage operation exceeded its time budget
    #[error("redemption timed out")]
    Timeout,
}

impl From<LedgerError> for RedemptionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CustomerNotFound => RedemptionError::CustomerNotFound,
            LedgerError::Timeout => RedemptionError::Timeout,
            other => RedemptionError::LedgerRejected(other),
        }
    }
}

/// Errors raised while issuing a new code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error("customer not found")]
    CustomerNotFound,

    #[error("unknown reward '{0}'")]
    UnknownReward(String),

    /// Every attempt collided with a pending code
    #[error("no free code after {0} attempts")]
    Exhausted(u32),

    #[error("code issuance timed out")]
    Timeout,
}
