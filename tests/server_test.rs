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

//! Integration tests for the REST API server.
//!
//! Each test starts the real service on an ephemeral port and drives it
//! with reqwest, including bursts of concurrent requests.

use loyalty_ledger::http::{BalanceResponse, ErrorResponse};
use loyalty_ledger::supervisor::Service;
use loyalty_ledger::{
    AppConfig, Coordinator, Customer, CustomerId, HistoryEntry, IssuedCode, Redemption, Reward,
};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    coordinator: Arc<Coordinator>,
    service: Service,
}

impl TestServer {
    async fn new() -> Self {
        let coordinator = Arc::new(AppConfig::default().build_coordinator().unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let service =
            Service::start(coordinator.clone(), listener, Duration::from_secs(30)).unwrap();
        let base_url = format!("http://{}", service.local_addr());

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/rewards", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }

        TestServer {
            base_url,
            coordinator,
            service,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, client: &Client, id: &str) {
        let response = client
            .post(self.url("/customers"))
            .json(&json!({ "customer_id": id, "display_name": id }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}

// === Tests ===

/// Accrue, issue, redeem, then try the same code again.
#[tokio::test]
async fn redemption_flow_over_http() {
    let server = TestServer::new().await;
    let client = Client::new();

    let response = client
        .post(server.url("/customers"))
        .json(&json!({ "customer_id": "alice", "display_name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let customer: Customer = response.json().await.unwrap();
    assert_eq!(customer.balance, Decimal::ZERO);

    let response = client
        .post(server.url("/customers"))
        .json(&json!({ "customer_id": "alice", "display_name": "Someone" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let customer: Customer = response.json().await.unwrap();
    assert_eq!(customer.display_name, "Alice");

    let response = client
        .post(server.url("/customers/alice/purchases"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(server.url("/codes"))
        .json(&json!({ "customer_id": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let issued: IssuedCode = response.json().await.unwrap();
    assert_eq!(issued.code.as_str().len(), 6);

    let response = client
        .post(server.url("/redemptions"))
        .json(&json!({ "code": issued.code, "delta": "-2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let redemption: Redemption = response.json().await.unwrap();
    assert_eq!(redemption.new_balance, Decimal::ZERO);

    let response = client
        .post(server.url("/redemptions"))
        .json(&json!({ "code": issued.code, "delta": "-2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "CODE_INVALID");

    let balance: BalanceResponse = client
        .get(server.url("/customers/alice/balance"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balance.customer_id, CustomerId::from("alice"));
    assert_eq!(balance.balance, Decimal::ZERO);

    let history: Vec<HistoryEntry> = client
        .get(server.url("/customers/alice/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].delta, dec!(-2));

    server.service.shutdown().await.unwrap();
}

/// Catalog rewards can be listed, earmarked and redeemed.
#[tokio::test]
async fn reward_flow_over_http() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, "alice").await;

    for _ in 0..2 {
        client
            .post(server.url("/customers/alice/purchases"))
            .send()
            .await
            .unwrap();
    }

    let catalog: Vec<Reward> = client
        .get(server.url("/rewards"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(catalog.len(), 2);

    let affordable: Vec<Reward> = client
        .get(server.url("/customers/alice/rewards"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(affordable.len(), 2);

    let issued: IssuedCode = client
        .post(server.url("/codes"))
        .json(&json!({ "customer_id": "alice", "reward": "drink" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(issued.reward.as_deref(), Some("drink"));

    let redemption: Redemption = client
        .post(server.url("/redemptions"))
        .json(&json!({ "code": issued.code, "reward": "drink" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(redemption.new_balance, dec!(2));

    let issued: IssuedCode = client
        .post(server.url("/codes"))
        .json(&json!({ "customer_id": "alice", "reward": "drink" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let response = client
        .post(server.url("/redemptions"))
        .json(&json!({ "code": issued.code, "delta": "100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "CODE_INVALID");
    assert_eq!(server.coordinator.get_balance(&CustomerId::from("alice")).unwrap(), dec!(2));

    server.service.shutdown().await.unwrap();
}

/// Error responses carry the right status and machine-readable code.
#[tokio::test]
async fn error_responses() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, "alice").await;

    let cases = [
        (
            client.get(server.url("/customers/ghost/balance")),
            StatusCode::NOT_FOUND,
            "CUSTOMER_NOT_FOUND",
        ),
        (
            client
                .post(server.url("/codes"))
                .json(&json!({ "customer_id": "ghost" })),
            StatusCode::NOT_FOUND,
            "CUSTOMER_NOT_FOUND",
        ),
        (
            client
                .post(server.url("/codes"))
                .json(&json!({ "customer_id": "alice", "reward": "cake" })),
            StatusCode::NOT_FOUND,
            "UNKNOWN_REWARD",
        ),
        (
            client
                .post(server.url("/redemptions"))
                .json(&json!({ "code": "123456", "delta": "-1", "reward": "drink" })),
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
        ),
        (
            client
                .post(server.url("/redemptions"))
                .json(&json!({ "code": "123456", "delta": "0" })),
            StatusCode::UNPROCESSABLE_ENTITY,
            "LEDGER_REJECTED",
        ),
    ];

    for (request, status, code) in cases {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), status);
        let error: ErrorResponse = response.json().await.unwrap();
        assert_eq!(error.code, code);
    }

    server.service.shutdown().await.unwrap();
}

/// After shutdown the listener is closed.
#[tokio::test]
async fn shutdown_stops_serving() {
    let server = TestServer::new().await;
    let client = Client::new();
    let url = server.url("/rewards");

    assert!(client.get(&url).send().await.is_ok());
    server.service.shutdown().await.unwrap();

    assert!(client.get(&url).send().await.is_err());
}

// === Load Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Concurrent purchases for one customer all land exactly once.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_purchases_single_customer() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, "alice").await;

    const NUM_REQUESTS: usize = 1000;
    const BATCH_SIZE: usize = 100; // Limit concurrent connections

    let start = Instant::now();
    let mut successful = 0usize;

    for _ in 0..NUM_REQUESTS / BATCH_SIZE {
        let handles: Vec<_> = (0..BATCH_SIZE)
            .map(|_| {
                let client = client.clone();
                let url = server.url("/customers/alice/purchases");
                tokio::spawn(async move { client.post(&url).send().await.unwrap().status() })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(handles).await;
        successful += results
            .iter()
            .filter(|r| r.as_ref().unwrap().is_success())
            .count();
    }

    let elapsed = start.elapsed();
    println!(
        "Processed {} requests in {:?} ({:.0} req/s)",
        NUM_REQUESTS,
        elapsed,
        NUM_REQUESTS as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(successful, NUM_REQUESTS, "All purchases should succeed");
    let alice = CustomerId::from("alice");
    assert_eq!(
        server.coordinator.get_balance(&alice).unwrap(),
        dec!(2) * Decimal::from(NUM_REQUESTS)
    );
    assert_eq!(server.coordinator.history(&alice).unwrap().len(), NUM_REQUESTS);

    server.service.shutdown().await.unwrap();
}

/// Racing redemptions of one code: exactly one request wins.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_redemptions_same_code() {
    let server = TestServer::new().await;
    let client = Client::new();
    let alice = CustomerId::from("alice");
    server
        .coordinator
        .import_customer(&alice, "Alice", dec!(100))
        .unwrap();
    let issued = server.coordinator.issue_code(&alice).unwrap();

    const NUM_REQUESTS: usize = 50;

    let handles: Vec<_> = (0..NUM_REQUESTS)
        .map(|_| {
            let client = client.clone();
            let url = server.url("/redemptions");
            let body = json!({ "code": issued.code, "delta": "-5" });
            tokio::spawn(async move { client.post(&url).json(&body).send().await.unwrap().status() })
        })
        .collect();

    let statuses: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = statuses.iter().filter(|s| s.is_success()).count();
    assert_eq!(winners, 1);
    assert!(
        statuses
            .iter()
            .filter(|s| !s.is_success())
            .all(|s| *s == StatusCode::UNPROCESSABLE_ENTITY)
    );
    assert_eq!(server.coordinator.get_balance(&alice).unwrap(), dec!(95));

    server.service.shutdown().await.unwrap();
}

/// Listing views stay consistent while many customers are written.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn list_customers_under_load() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_CUSTOMERS: usize = 200;

    let writers: Vec<_> = (0..NUM_CUSTOMERS)
        .map(|i| {
            let client = client.clone();
            let register = server.url("/customers");
            let purchase = server.url(&format!("/customers/customer-{i}/purchases"));
            tokio::spawn(async move {
                client
                    .post(&register)
                    .json(&json!({ "customer_id": format!("customer-{i}"), "display_name": "C" }))
                    .send()
                    .await
                    .unwrap();
                client.post(&purchase).send().await.unwrap().status()
            })
        })
        .collect();

    let readers: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = server.url("/customers");
            tokio::spawn(async move {
                let customers: Vec<Customer> =
                    client.get(&url).send().await.unwrap().json().await.unwrap();
                assert!(customers.len() <= NUM_CUSTOMERS);
                assert!(customers.windows(2).all(|pair| pair[0].id < pair[1].id));
            })
        })
        .collect();

    for status in futures::future::join_all(writers).await {
        assert_eq!(status.unwrap(), StatusCode::CREATED);
    }
    for reader in futures::future::join_all(readers).await {
        reader.unwrap();
    }

    let history: Vec<HistoryEntry> = client
        .get(server.url("/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), NUM_CUSTOMERS);

    server.service.shutdown().await.unwrap();
}
