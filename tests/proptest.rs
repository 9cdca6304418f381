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

//! Property-based tests for the ledger and the coordinator.
//!
//! These tests verify invariants that should hold for any sequence of
//! accruals and redemptions.

use loyalty_ledger::{
    AppConfig, Code, CodeGenerator, CodeStore, CodeStoreError, CustomerId, CustomerLedger,
    EntryKind, LedgerError, MemoryCodeStore, PendingCode, RandomCodeGenerator,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a non-zero signed delta (up to 1000 points with 2 decimal places).
fn arb_delta() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (1i64..=100_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        (1i64..=100_000i64).prop_map(|cents| Decimal::new(-cents, 2)),
    ]
}

fn arb_opening() -> impl Strategy<Value = Decimal> {
    (0i64..=50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn kind_of(delta: Decimal) -> EntryKind {
    if delta > Decimal::ZERO {
        EntryKind::Accrual
    } else {
        EntryKind::Redemption
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Balance equals the opening balance plus every accepted delta.
    #[test]
    fn balance_equals_opening_plus_accepted(
        opening in arb_opening(),
        deltas in prop::collection::vec(arb_delta(), 0..40),
    ) {
        let ledger = CustomerLedger::new();
        let alice = CustomerId::from("alice");
        ledger.create_with_balance(&alice, "Alice", opening).unwrap();

        let mut expected = opening;
        for delta in deltas {
            match ledger.apply_delta(&alice, delta, kind_of(delta)) {
                Ok(entry) => {
                    expected += delta;
                    prop_assert_eq!(entry.balance_after, expected);
                }
                Err(e) => {
                    prop_assert_eq!(e, LedgerError::InsufficientBalance);
                    prop_assert!(expected + delta < Decimal::ZERO);
                }
            }
        }

        prop_assert_eq!(ledger.get_balance(&alice).unwrap(), expected);
    }

    /// Balance is never negative after any operation.
    #[test]
    fn balance_never_negative(
        deltas in prop::collection::vec(arb_delta(), 1..40),
    ) {
        let ledger = CustomerLedger::new();
        let alice = CustomerId::from("alice");
        ledger.create(&alice, "Alice").unwrap();

        for delta in deltas {
            let _ = ledger.apply_delta(&alice, delta, kind_of(delta));
            prop_assert!(ledger.get_balance(&alice).unwrap() >= Decimal::ZERO);
        }
    }

    /// History deltas sum to the balance change and each entry chains from the previous.
    #[test]
    fn history_reconciles(
        opening in arb_opening(),
        deltas in prop::collection::vec(arb_delta(), 0..40),
    ) {
        let ledger = CustomerLedger::new();
        let alice = CustomerId::from("alice");
        ledger.create_with_balance(&alice, "Alice", opening).unwrap();

        for delta in deltas {
            let _ = ledger.apply_delta(&alice, delta, kind_of(delta));
        }

        let history = ledger.history(&alice).unwrap();
        let mut running = opening;
        for entry in &history {
            running += entry.delta;
            prop_assert_eq!(entry.balance_after, running);
            prop_assert!(entry.kind.accepts(entry.delta));
        }
        prop_assert_eq!(ledger.get_balance(&alice).unwrap(), running);
        prop_assert!(history.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    /// A delta whose sign disagrees with its kind never changes anything.
    #[test]
    fn mismatched_kind_rejected(
        opening in arb_opening(),
        delta in arb_delta(),
    ) {
        let ledger = CustomerLedger::new();
        let alice = CustomerId::from("alice");
        ledger.create_with_balance(&alice, "Alice", opening).unwrap();

        let wrong = match kind_of(delta) {
            EntryKind::Accrual => EntryKind::Redemption,
            EntryKind::Redemption => EntryKind::Accrual,
        };
        prop_assert_eq!(
            ledger.apply_delta(&alice, delta, wrong),
            Err(LedgerError::InvalidDelta)
        );
        prop_assert_eq!(ledger.get_balance(&alice).unwrap(), opening);
        prop_assert!(ledger.history(&alice).unwrap().is_empty());
    }
}

// =============================================================================
// Code Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Generated codes are fixed-width decimal strings without a leading zero.
    #[test]
    fn generated_codes_are_well_formed(digits in 6u32..=9) {
        let generator = RandomCodeGenerator::with_digits(digits).unwrap();
        let code = generator.issue();

        prop_assert_eq!(code.as_str().len(), digits as usize);
        prop_assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
        prop_assert!(!code.as_str().starts_with('0'));
    }

    /// Whatever the put/take interleaving, a code is handed out at most once.
    #[test]
    fn code_taken_at_most_once(
        ops in prop::collection::vec((0u8..4, any::<bool>()), 1..60),
    ) {
        let store = MemoryCodeStore::new();
        let mut pending = [false; 4];

        for (slot, is_put) in ops {
            let code = Code::new(format!("10000{slot}"));
            if is_put {
                let result = store.put(PendingCode::new(
                    code,
                    CustomerId::from("alice"),
                    chrono::Utc::now(),
                    None,
                ));
                if pending[slot as usize] {
                    prop_assert_eq!(result, Err(CodeStoreError::Collision));
                } else {
                    prop_assert!(result.is_ok());
                    pending[slot as usize] = true;
                }
            } else {
                let result = store.take(&code);
                if pending[slot as usize] {
                    prop_assert!(result.is_ok());
                    pending[slot as usize] = false;
                } else {
                    prop_assert_eq!(result, Err(CodeStoreError::NotFound));
                }
            }
        }

        prop_assert_eq!(store.len(), pending.iter().filter(|p| **p).count());
    }

    /// Redeeming with a fresh code succeeds exactly when the ledger allows the delta.
    #[test]
    fn redemption_matches_ledger_outcome(
        purchases in 0usize..10,
        delta in arb_delta(),
    ) {
        let coordinator = AppConfig::default().build_coordinator().unwrap();
        let alice = CustomerId::from("alice");
        coordinator.register_customer(&alice, "Alice").unwrap();
        for _ in 0..purchases {
            coordinator.record_purchase(&alice).unwrap();
        }
        let before = coordinator.get_balance(&alice).unwrap();

        let issued = coordinator.issue_code(&alice).unwrap();
        let result = coordinator.redeem_code(&issued.code, delta);

        if before + delta >= Decimal::ZERO {
            prop_assert_eq!(result.unwrap().new_balance, before + delta);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(coordinator.get_balance(&alice).unwrap(), before);
        }
        prop_assert_eq!(coordinator.pending_codes(), 0);
    }
}
