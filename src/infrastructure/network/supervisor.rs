// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::ROTATION_DEBOUNCE_SECS;
use crate::domain::error::AppError;
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// The one chain client dependents are allowed to hold only transiently:
/// fetch it per operation, never across a rotation.
pub type ChainClient = DynProvider;

#[derive(Debug, Clone)]
pub struct SwitchEvent {
    pub generation: u64,
    pub endpoint: String,
}

struct Active {
    index: usize,
    client: ChainClient,
}

/// Ordered endpoint ring with exactly one live client. WS endpoints are
/// probed every 30s; HTTP endpoints rotate only on caller-reported
/// instability. Rotation is single-flight: concurrent triggers collapse.
pub struct EndpointSupervisor {
    endpoints: Vec<String>,
    wallet: EthereumWallet,
    wallet_address: Address,
    active: RwLock<Active>,
    rotation: Mutex<()>,
    switch_tx: broadcast::Sender<SwitchEvent>,
    generation: AtomicU64,
}

impl EndpointSupervisor {
    pub async fn connect(
        endpoints: Vec<String>,
        signer: PrivateKeySigner,
    ) -> Result<Arc<Self>, AppError> {
        if endpoints.is_empty() {
            return Err(AppError::Config("Endpoint list is empty".to_string()));
        }

        let wallet_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let mut last_err = None;
        for (index, url) in endpoints.iter().enumerate() {
            match Self::connect_endpoint(url, &wallet).await {
                Ok(client) => {
                    tracing::info!(target: "rpc", %url, "Connected to RPC endpoint");
                    let (switch_tx, _) = broadcast::channel(16);
                    return Ok(Arc::new(Self {
                        endpoints,
                        wallet,
                        wallet_address,
                        active: RwLock::new(Active { index, client }),
                        rotation: Mutex::new(()),
                        switch_tx,
                        generation: AtomicU64::new(0),
                    }));
                }
                Err(e) => {
                    tracing::warn!(target: "rpc", %url, error = %e, "Endpoint unreachable, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::Connection("No endpoints".to_string())))
    }

    async fn connect_endpoint(url: &str, wallet: &EthereumWallet) -> Result<ChainClient, AppError> {
        let provider = ProviderBuilder::new()
            .wallet(wallet.clone())
            .connect(url)
            .await
            .map_err(|e| AppError::Connection(format!("{url}: {e}")))?;
        Ok(provider.erased())
    }

    pub async fn current_client(&self) -> ChainClient {
        self.active.read().await.client.clone()
    }

    pub async fn current_endpoint(&self) -> String {
        self.endpoints[self.active.read().await.index].clone()
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// After a switch, previously held clients and subscriptions are dead;
    /// receivers must re-fetch `current_client` and re-subscribe.
    pub fn subscribe_switch(&self) -> broadcast::Receiver<SwitchEvent> {
        self.switch_tx.subscribe()
    }

    /// Caller-side rotation signal for read paths that exhausted retries.
    pub async fn report_instability(&self, err: &AppError) {
        if err.wants_endpoint_rotation() {
            self.rotate(&format!("caller-reported: {err}")).await;
        }
    }

    /// Advance the ring to the next reachable endpoint. The old client is
    /// dropped (closing its socket), replaced after a debounce sleep, and a
    /// switch event is broadcast so dependents rebind.
    pub async fn rotate(&self, reason: &str) {
        // Collapse concurrent triggers into the rotation already in flight.
        let Ok(_guard) = self.rotation.try_lock() else {
            return;
        };
        tracing::warn!(target: "rpc", reason, "Rotating RPC endpoint");
        sleep(Duration::from_secs(ROTATION_DEBOUNCE_SECS)).await;

        let start = self.active.read().await.index;
        let n = self.endpoints.len();
        for step in 1..=n {
            let index = (start + step) % n;
            let url = &self.endpoints[index];
            match Self::connect_endpoint(url, &self.wallet).await {
                Ok(client) => {
                    *self.active.write().await = Active { index, client };
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = self.switch_tx.send(SwitchEvent {
                        generation,
                        endpoint: url.clone(),
                    });
                    tracing::info!(target: "rpc", %url, generation, "Switched RPC endpoint");
                    return;
                }
                Err(e) => {
                    tracing::warn!(target: "rpc", %url, error = %e, "Rotation candidate unreachable");
                }
            }
        }
        tracing::error!(target: "rpc", "All endpoints unreachable; keeping current client");
    }

    fn is_ws(url: &str) -> bool {
        url.starts_with("ws://") || url.starts_with("wss://")
    }

    /// Heartbeat probe for WS endpoints: any failed cheap read rotates.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(target: "rpc", "Heartbeat stopped");
                        return;
                    }
                    _ = sleep(interval) => {}
                }
                if !Self::is_ws(&supervisor.current_endpoint().await) {
                    continue;
                }
                let client = supervisor.current_client().await;
                let probe = timeout(Duration::from_secs(10), client.get_block_number()).await;
                match probe {
                    Ok(Ok(number)) => {
                        tracing::trace!(target: "rpc", number, "Heartbeat ok");
                    }
                    Ok(Err(e)) => {
                        supervisor.rotate(&format!("heartbeat error: {e}")).await;
                    }
                    Err(_) => {
                        supervisor.rotate("heartbeat timed out").await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_detection() {
        assert!(EndpointSupervisor::is_ws("wss://node.example/ws"));
        assert!(EndpointSupervisor::is_ws("ws://127.0.0.1:8546"));
        assert!(!EndpointSupervisor::is_ws("https://node.example/rpc"));
    }
}
