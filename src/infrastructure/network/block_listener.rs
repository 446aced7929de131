// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::infrastructure::network::supervisor::EndpointSupervisor;
use alloy::primitives::B256;
use alloy::providers::Provider;
use alloy::rpc::types::{BlockNumberOrTag, Header};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

pub struct BlockListener {
    supervisor: Arc<EndpointSupervisor>,
    broadcaster: Sender<Header>,
    shutdown: CancellationToken,
}

impl BlockListener {
    pub fn new(
        supervisor: Arc<EndpointSupervisor>,
        broadcaster: Sender<Header>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            broadcaster,
            shutdown,
        }
    }

    /// Subscribe to newHeads on the live client; fall back to polling when
    /// the endpoint cannot stream. An endpoint switch invalidates the
    /// subscription, so the loop re-fetches the client and resubscribes.
    pub async fn run(self) {
        tracing::info!(target: "blocks", "BlockListener starting");
        let mut last_hash: Option<B256> = None;
        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "blocks", "Shutdown requested; stopping block listener");
                return;
            }

            let client = self.supervisor.current_client().await;
            let mut switch_rx = self.supervisor.subscribe_switch();

            match client.subscribe_blocks().await {
                Ok(sub) => {
                    let mut stream = sub.into_stream();
                    tracing::info!(target: "blocks", "Subscribed to newHeads");
                    loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => {
                                tracing::info!(target: "blocks", "Shutdown requested; exiting newHeads stream");
                                return;
                            }
                            switched = switch_rx.recv() => {
                                if let Ok(ev) = switched {
                                    tracing::info!(target: "blocks", endpoint = %ev.endpoint, "Endpoint switched; resubscribing");
                                }
                                break;
                            }
                            maybe_header = stream.next() => {
                                match maybe_header {
                                    Some(header) => {
                                        last_hash = Some(header.hash);
                                        let _ = self.broadcaster.send(header);
                                    }
                                    None => {
                                        tracing::warn!(target: "blocks", "newHeads stream ended");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "blocks", error = %e, "Subscription unavailable; polling");
                    self.poll_once(&mut last_hash).await;
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "blocks", "Shutdown requested during backoff");
                    return;
                }
                _ = sleep(Duration::from_secs(2)) => {}
            }
        }
    }

    async fn poll_once(&self, last_hash: &mut Option<B256>) {
        let client = self.supervisor.current_client().await;
        match client.get_block_by_number(BlockNumberOrTag::Latest).await {
            Ok(Some(block)) => {
                let hash = block.header.hash;
                if last_hash.map(|h| h != hash).unwrap_or(true) {
                    *last_hash = Some(hash);
                    let _ = self.broadcaster.send(block.header);
                }
            }
            Ok(None) => {
                tracing::debug!(target: "blocks", "Polling latest block returned None");
            }
            Err(e) => {
                tracing::warn!(target: "blocks", error = %e, "Polling latest block failed");
            }
        }
    }
}
