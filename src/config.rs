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

//! Runtime configuration.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. `LOYALTY__`-prefixed environment variables, with `__` separating
//!    nested keys (`LOYALTY__LEDGER__LOCK_TIMEOUT_MS=500` -> `ledger.lock_timeout_ms`).
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [codes]
//! digits = 6
//! ttl_secs = 900
//!
//! [rewards]
//! drink = 2
//! food = 4
//! ```

use crate::catalog::{InvalidRewardCost, RewardCatalog};
use crate::code::RandomCodeGenerator;
use crate::code_store::MemoryCodeStore;
use crate::coordinator::{Coordinator, CoordinatorSettings};
use crate::ledger::CustomerLedger;
use chrono::TimeDelta;
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "LOYALTY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<InvalidRewardCost> for ConfigError {
    fn from(err: InvalidRewardCost) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodesConfig {
    /// Code width, 6 to 9 digits.
    pub digits: u32,
    /// Code lifetime; 0 disables expiry.
    pub ttl_secs: u64,
    pub max_issue_attempts: u32,
    pub sweep_interval_secs: u64,
    /// Budget for a single code store operation.
    pub op_timeout_ms: u64,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            digits: RandomCodeGenerator::DEFAULT_DIGITS,
            ttl_secs: 900,
            max_issue_attempts: 8,
            sweep_interval_secs: 30,
            op_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Budget for acquiring a customer's row lock.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccrualConfig {
    pub points_per_purchase: Decimal,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            points_per_purchase: Decimal::TWO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub codes: CodesConfig,
    pub ledger: LedgerConfig,
    pub accrual: AccrualConfig,
    /// Reward name to point cost.
    pub rewards: BTreeMap<String, Decimal>,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            codes: CodesConfig::default(),
            ledger: LedgerConfig::default(),
            accrual: AccrualConfig::default(),
            rewards: BTreeMap::from([
                ("drink".to_string(), Decimal::TWO),
                ("food".to_string(), Decimal::from(4)),
            ]),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, then `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if RandomCodeGenerator::with_digits(self.codes.digits).is_none() {
            return Err(ConfigError::Invalid(format!(
                "codes.digits must be between {} and {}, got {}",
                RandomCodeGenerator::MIN_DIGITS,
                RandomCodeGenerator::MAX_DIGITS,
                self.codes.digits
            )));
        }
        if self.codes.max_issue_attempts == 0 {
            return Err(ConfigError::Invalid(
                "codes.max_issue_attempts must be at least 1".to_string(),
            ));
        }
        if self.codes.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "codes.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.codes.ttl_secs > i64::MAX as u64 / 1000 {
            return Err(ConfigError::Invalid("codes.ttl_secs is too large".to_string()));
        }
        if self.accrual.points_per_purchase <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "accrual.points_per_purchase must be positive".to_string(),
            ));
        }
        RewardCatalog::new(self.rewards.clone())?;
        Ok(())
    }

    pub fn code_ttl(&self) -> Option<TimeDelta> {
        match self.codes.ttl_secs {
            0 => None,
            secs => TimeDelta::try_seconds(secs as i64),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.codes.sweep_interval_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.codes.op_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.lock_timeout_ms)
    }

    pub fn catalog(&self) -> Result<RewardCatalog, ConfigError> {
        Ok(RewardCatalog::new(self.rewards.clone())?)
    }

    /// Wires a coordinator with in-process stores.
    pub fn build_coordinator(&self) -> Result<Coordinator, ConfigError> {
        self.validate()?;
        let generator = RandomCodeGenerator::with_digits(self.codes.digits).ok_or_else(|| {
            ConfigError::Invalid(format!("unsupported code width {}", self.codes.digits))
        })?;
        Ok(Coordinator::new(
            CustomerLedger::with_lock_timeout(self.lock_timeout()),
            Arc::new(MemoryCodeStore::with_timeout(self.op_timeout())),
            Arc::new(generator),
            Arc::new(self.catalog()?),
            CoordinatorSettings {
                code_ttl: self.code_ttl(),
                max_issue_attempts: self.codes.max_issue_attempts,
                points_per_purchase: self.accrual.points_per_purchase,
            },
        ))
    }
}
