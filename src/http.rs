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

//! Thin JSON-over-HTTP transport for the [`Coordinator`].
//!
//! ## Endpoints
//!
//! - `POST /customers` - Register a customer (201 when created, 200 when it already existed)
//! - `GET /customers` - List customers
//! - `GET /customers/{id}` - Get one customer
//! - `GET /customers/{id}/balance` - Current balance
//! - `GET /customers/{id}/history` - History entries of one customer
//! - `GET /customers/{id}/rewards` - Rewards the customer can afford
//! - `POST /customers/{id}/purchases` - Credit the per-purchase points
//! - `POST /codes` - Issue a code
//! - `POST /redemptions` - Redeem a code for a delta or a reward
//! - `GET /history` - The whole history table
//! - `GET /rewards` - The reward catalog
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/customers \
//!   -H "Content-Type: application/json" \
//!   -d '{"customer_id": "42", "display_name": "Alice"}'
//!
//! curl -X POST http://localhost:3000/codes \
//!   -H "Content-Type: application/json" \
//!   -d '{"customer_id": "42"}'
//!
//! curl -X POST http://localhost:3000/redemptions \
//!   -H "Content-Type: application/json" \
//!   -d '{"code": "123456", "delta": "-2"}'
//! ```

use crate::base::{Code, CustomerId};
use crate::catalog::Reward;
use crate::coordinator::{Coordinator, IssuedCode, Redemption};
use crate::customer::{Customer, HistoryEntry};
use crate::error::{IssueError, LedgerError, RedemptionError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// === Request/Response DTOs ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub customer_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    pub customer_id: String,
    #[serde(default)]
    pub reward: Option<String>,
}

/// Exactly one of `delta` and `reward` must be set.
///
/// ```json
/// {"code": "123456", "delta": "-2"}
/// {"code": "123456", "reward": "drink"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    #[serde(default)]
    pub delta: Option<Decimal>,
    #[serde(default)]
    pub reward: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub customer_id: CustomerId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

// === Error Handling ===

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Issue(IssueError),
    Redemption(RedemptionError),
    BadRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        ApiError::Issue(err)
    }
}

impl From<RedemptionError> for ApiError {
    fn from(err: RedemptionError) -> Self {
        ApiError::Redemption(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(err) => match err {
                LedgerError::CustomerNotFound => (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND"),
                LedgerError::InsufficientBalance => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
                }
                LedgerError::InvalidDelta => (StatusCode::BAD_REQUEST, "INVALID_DELTA"),
                LedgerError::AlreadyExists => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
                LedgerError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "TIMEOUT"),
            },
            ApiError::Issue(err) => match err {
                IssueError::CustomerNotFound => (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND"),
                IssueError::UnknownReward(_) => (StatusCode::NOT_FOUND, "UNKNOWN_REWARD"),
                IssueError::Exhausted(_) => (StatusCode::CONFLICT, "CODES_EXHAUSTED"),
                IssueError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "TIMEOUT"),
            },
            ApiError::Redemption(err) => match err {
                RedemptionError::CodeInvalid => (StatusCode::UNPROCESSABLE_ENTITY, "CODE_INVALID"),
                RedemptionError::CustomerNotFound => {
                    (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND")
                }
                RedemptionError::LedgerRejected(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "LEDGER_REJECTED")
                }
                RedemptionError::UnknownReward(_) => (StatusCode::NOT_FOUND, "UNKNOWN_REWARD"),
                RedemptionError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "TIMEOUT"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Ledger(err) => err.to_string(),
            ApiError::Issue(err) => err.to_string(),
            ApiError::Redemption(err) => err.to_string(),
            ApiError::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (
            status,
            Json(ErrorResponse {
                error: self.message(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

async fn register_customer(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let registration = state
        .coordinator
        .register_customer(&CustomerId(request.customer_id), &request.display_name)?;
    let status = if registration.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(registration.into_customer())))
}

async fn list_customers(State(state): State<AppState>) -> Result<Json<Vec<Customer>>, ApiError> {
    Ok(Json(state.coordinator.customers()?))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    Ok(Json(state.coordinator.customer(&CustomerId(id))?))
}

async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let customer_id = CustomerId(id);
    let balance = state.coordinator.get_balance(&customer_id)?;
    Ok(Json(BalanceResponse {
        customer_id,
        balance,
    }))
}

async fn customer_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.coordinator.history(&CustomerId(id))?))
}

async fn affordable_rewards(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reward>>, ApiError> {
    Ok(Json(state.coordinator.affordable_rewards(&CustomerId(id))?))
}

async fn record_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<HistoryEntry>), ApiError> {
    let entry = state.coordinator.record_purchase(&CustomerId(id))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn issue_code(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> Result<(StatusCode, Json<IssuedCode>), ApiError> {
    let customer_id = CustomerId(request.customer_id);
    let issued = match request.reward {
        Some(reward) => state.coordinator.issue_reward_code(&customer_id, &reward)?,
        None => state.coordinator.issue_code(&customer_id)?,
    };
    Ok((StatusCode::CREATED, Json(issued)))
}

async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<Redemption>, ApiError> {
    let code = Code(request.code);
    let redemption = match (request.delta, request.reward) {
        (Some(delta), None) => state.coordinator.redeem_code(&code, delta)?,
        (None, Some(reward)) => state.coordinator.redeem_reward(&code, &reward)?,
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of 'delta' and 'reward' is required".to_string(),
            ));
        }
    };
    Ok(Json(redemption))
}

async fn all_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.coordinator.all_history()?))
}

async fn list_rewards(State(state): State<AppState>) -> Json<Vec<Reward>> {
    Json(state.coordinator.catalog().rewards())
}

// === Router ===

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/customers", post(register_customer).get(list_customers))
        .route("/customers/{id}", get(get_customer))
        .route("/customers/{id}/balance", get(get_balance))
        .route("/customers/{id}/history", get(customer_history))
        .route("/customers/{id}/rewards", get(affordable_rewards))
        .route("/customers/{id}/purchases", post(record_purchase))
        .route("/codes", post(issue_code))
        .route("/redemptions", post(redeem))
        .route("/history", get(all_history))
        .route("/rewards", get(list_rewards))
        .with_state(AppState { coordinator })
}
