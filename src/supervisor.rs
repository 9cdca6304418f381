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

//! Process supervision: the HTTP server and the expiry sweeper run as owned
//! tasks with a defined shutdown sequence.
//!
//! [`Service::shutdown`] flips a watch channel, which makes the server stop
//! accepting connections and drain in-flight requests, and stops the sweeper.
//! Both handles are joined before it returns.

use crate::coordinator::Coordinator;
use crate::http;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Periodically drops expired codes until `shutdown` flips to `true`.
pub fn spawn_sweeper(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    coordinator.sweep_expired();
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        debug!("sweeper stopped");
    })
}

/// Running HTTP server plus sweeper.
pub struct Service {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<io::Result<()>>,
    sweeper: JoinHandle<()>,
}

impl Service {
    /// Starts serving `coordinator` on `listener`.
    pub fn start(
        coordinator: Arc<Coordinator>,
        listener: TcpListener,
        sweep_interval: Duration,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = watch::channel(false);

        let sweeper = spawn_sweeper(Arc::clone(&coordinator), sweep_interval, signal.clone());

        let app = http::router(coordinator);
        let mut server_signal = signal;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_signal.wait_for(|stop| *stop).await;
                })
                .await
        });

        info!(addr = %local_addr, "loyalty ledger listening");
        Ok(Self {
            local_addr,
            shutdown,
            server,
            sweeper,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests, drains in-flight ones, stops the sweeper.
    pub async fn shutdown(self) -> io::Result<()> {
        info!("shutting down");
        // Receivers live inside the tasks; a send error means both already exited
        let _ = self.shutdown.send(true);

        let served = self.server.await.map_err(io::Error::other)?;
        self.sweeper.await.map_err(io::Error::other)?;
        info!("shutdown complete");
        served
    }
}
