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

//! # Loyalty Ledger
//!
//! This library runs the core of a loyalty-points program: customers accrue
//! points on purchases and redeem them through short-lived, single-use codes.
//!
//! ## Core Components
//!
//! - [`CodeGenerator`]: Produces fixed-width numeric codes
//! - [`CodeStore`]: Pending codes with expiry and atomic single-use consumption
//! - [`CustomerLedger`]: Balances and the append-only history
//! - [`Coordinator`]: Issues codes and runs redemptions end to end
//!
//! ## Example
//!
//! ```
//! use loyalty_ledger::{AppConfig, CustomerId};
//! use rust_decimal_macros::dec;
//!
//! let coordinator = AppConfig::default().build_coordinator().unwrap();
//! let alice = CustomerId::from("alice");
//! coordinator.register_customer(&alice, "Alice").unwrap();
//! coordinator.record_purchase(&alice).unwrap();
//!
//! let issued = coordinator.issue_code(&alice).unwrap();
//! let redemption = coordinator.redeem_code(&issued.code, dec!(-2)).unwrap();
//! assert_eq!(redemption.new_balance, dec!(0));
//!
//! // A consumed code cannot be used again
//! assert!(coordinator.redeem_code(&issued.code, dec!(-2)).is_err());
//! ```
//!
//! ## Thread Safety
//!
//! Codes are serialized per code and customers per identity; operations on
//! different customers proceed in parallel.

mod base;
pub mod catalog;
pub mod code;
pub mod code_store;
pub mod config;
pub mod coordinator;
mod customer;
pub mod error;
pub mod http;
mod ledger;
pub mod supervisor;
pub mod telemetry;

pub use base::{Code, CustomerId, EntryId};
pub use catalog::{Reward, RewardCatalog};
pub use code::{CodeGenerator, RandomCodeGenerator};
pub use code_store::{CodeStore, MemoryCodeStore, PendingCode};
pub use config::AppConfig;
pub use coordinator::{Coordinator, CoordinatorSettings, IssuedCode, Redemption, Registration};
pub use customer::{Customer, EntryKind, HistoryEntry};
pub use error::{CodeStoreError, IssueError, LedgerError, RedemptionError};
pub use ledger::CustomerLedger;
