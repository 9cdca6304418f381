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

//! Redemption code generation.
//!
//! Codes are fixed-width decimal strings with a non-zero leading digit, so a
//! six digit code is drawn from `100000..=999999` (900,000 values). Global
//! uniqueness is not attempted; the code store rejects collisions with
//! pending codes and the issuing path retries.

use crate::base::Code;
use rand::Rng;

/// Source of fresh redemption codes.
pub trait CodeGenerator: Send + Sync {
    fn issue(&self) -> Code;
}

/// Uniformly random fixed-width numeric codes.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodeGenerator {
    digits: u32,
    low: u32,
    high: u32,
}

impl RandomCodeGenerator {
    pub const DEFAULT_DIGITS: u32 = 6;
    pub const MIN_DIGITS: u32 = 6;
    pub const MAX_DIGITS: u32 = 9;

    /// Returns `None` when `digits` is outside `MIN_DIGITS..=MAX_DIGITS`.
    pub fn with_digits(digits: u32) -> Option<Self> {
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits) {
            return None;
        }
        let low = 10u32.pow(digits - 1);
        let high = 10u32.pow(digits) - 1;
        Some(Self { digits, low, high })
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Number of distinct codes this generator can produce.
    pub fn space(&self) -> u32 {
        self.high - self.low + 1
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self {
            digits: Self::DEFAULT_DIGITS,
            low: 100_000,
            high: 999_999,
        }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn issue(&self) -> Code {
        let value = rand::rng().random_range(self.low..=self.high);
        Code(value.to_string())
    }
}
