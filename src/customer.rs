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

//! Ledger records.
//!
//! A [`Customer`] is a snapshot of one ledger row. A [`HistoryEntry`] is an
//! immutable audit record written for every successful balance mutation:
//! accruals carry a positive delta, redemptions a negative one.

use crate::base::{CustomerId, EntryId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Accrual,
    Redemption,
}

impl EntryKind {
    /// Kind implied by the sign of `delta`; `None` for zero.
    pub fn for_delta(delta: Decimal) -> Option<Self> {
        if delta > Decimal::ZERO {
            Some(Self::Accrual)
        } else if delta < Decimal::ZERO {
            Some(Self::Redemption)
        } else {
            None
        }
    }

    /// Whether `delta` has the sign this kind requires.
    pub fn accepts(&self, delta: Decimal) -> bool {
        Self::for_delta(delta) == Some(*self)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accrual => write!(f, "accrual"),
            Self::Redemption => write!(f, "redemption"),
        }
    }
}

/// Point-in-time view of a customer row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub display_name: String,
    pub balance: Decimal,
    pub opening_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub delta: Decimal,
    pub kind: EntryKind,
    /// Balance right after this entry was applied.
    pub balance_after: Decimal,
    pub timestamp: DateTime<Utc>,
}
