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

//! Reward catalog: what each reward costs in points.
//!
//! Built once at startup from configuration and shared read-only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reward '{0}' must cost a positive number of points")]
pub struct InvalidRewardCost(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub name: String,
    pub cost: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardCatalog {
    rewards: BTreeMap<String, Decimal>,
}

impl RewardCatalog {
    /// Builds a catalog, rejecting rewards whose cost is zero or negative.
    pub fn new<I, S>(rewards: I) -> Result<Self, InvalidRewardCost>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let mut catalog = BTreeMap::new();
        for (name, cost) in rewards {
            let name = name.into();
            if cost <= Decimal::ZERO {
                return Err(InvalidRewardCost(name));
            }
            catalog.insert(name, cost);
        }
        Ok(Self { rewards: catalog })
    }

    pub fn cost(&self, name: &str) -> Option<Decimal> {
        self.rewards.get(name).copied()
    }

    /// All rewards, cheapest first.
    pub fn rewards(&self) -> Vec<Reward> {
        let mut rewards: Vec<Reward> = self
            .rewards
            .iter()
            .map(|(name, cost)| Reward {
                name: name.clone(),
                cost: *cost,
            })
            .collect();
        // BTreeMap order breaks ties by name
        rewards.sort_by(|a, b| a.cost.cmp(&b.cost));
        rewards
    }

    /// Rewards a customer holding `balance` points can pay for.
    pub fn affordable(&self, balance: Decimal) -> Vec<Reward> {
        self.rewards()
            .into_iter()
            .filter(|reward| reward.cost <= balance)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
