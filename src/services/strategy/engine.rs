// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::constants::{
    ATR_CACHE_SECS, ATR_PERIOD, CIRCUIT_BREAKER_DEVIATION_FACTOR, HEARTBEAT_INTERVAL_SECS,
    MIN_LOOP_INTERVAL_MS, NetworkProfile, SAFE_MODE_LOG_EVERY_BLOCKS,
};
use crate::domain::error::AppError;
use crate::domain::types::{OperatingMode, PositionInfo};
use crate::infrastructure::data::audit_log::{AuditKind, AuditLog};
use crate::infrastructure::data::market_data::MarketDataClient;
use crate::infrastructure::data::state_store::StateStore;
use crate::infrastructure::network::block_listener::BlockListener;
use crate::infrastructure::network::supervisor::EndpointSupervisor;
use crate::services::strategy::actions::ActionExecutor;
use crate::services::strategy::alerts::Mailer;
use crate::services::strategy::equity::compute_equity;
use crate::services::strategy::pipeline::RebalancePipeline;
use crate::services::strategy::planner::buffer_factor;
use alloy::primitives::U256;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Lifecycle-scoped loop state, mutated only inside the block handler.
struct LoopContext {
    mode: OperatingMode,
    is_processing: bool,
    last_run: Option<Instant>,
    cached_atr: Option<f64>,
    last_atr_update: Option<Instant>,
}

impl LoopContext {
    fn new() -> Self {
        Self {
            mode: OperatingMode::Normal,
            is_processing: false,
            last_run: None,
            cached_atr: None,
            last_atr_update: None,
        }
    }
}

/// The block-triggered state machine that owns the position. Every chain
/// mutation is gated here: TWAP and analytics inside the pipeline, circuit
/// breaker and hard equity stop in the handler itself.
pub struct Engine {
    supervisor: Arc<EndpointSupervisor>,
    profile: NetworkProfile,
    actions: Arc<ActionExecutor>,
    market: MarketDataClient,
    pipeline: RebalancePipeline,
    store: Arc<StateStore>,
    audit: Arc<AuditLog>,
    mailer: Arc<Mailer>,
    hard_stop_loss_usd: f64,
    analytics_interval: String,
    shutdown: CancellationToken,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        supervisor: Arc<EndpointSupervisor>,
        profile: NetworkProfile,
        actions: Arc<ActionExecutor>,
        market: MarketDataClient,
        pipeline: RebalancePipeline,
        store: Arc<StateStore>,
        audit: Arc<AuditLog>,
        mailer: Arc<Mailer>,
        hard_stop_loss_usd: f64,
        analytics_interval: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            profile,
            actions,
            market,
            pipeline,
            store,
            audit,
            mailer,
            hard_stop_loss_usd,
            analytics_interval,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        self.supervisor.spawn_heartbeat(
            Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            self.shutdown.clone(),
        );

        // Endpoint switches get an operator notification.
        {
            let mut switch_rx = self.supervisor.subscribe_switch();
            let mailer = Arc::clone(&self.mailer);
            let audit = Arc::clone(&self.audit);
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        ev = switch_rx.recv() => match ev {
                            Ok(ev) => {
                                audit.record(0, AuditKind::Info, 0.0, 0, &format!("rpc endpoint switched to {}", ev.endpoint));
                                mailer.send("RPC endpoint switched", &format!("Now using {}", ev.endpoint)).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            });
        }

        let (block_tx, mut block_rx) = broadcast::channel(32);
        let listener = BlockListener::new(
            Arc::clone(&self.supervisor),
            block_tx,
            self.shutdown.clone(),
        );
        tokio::spawn(listener.run());

        let mut ctx = LoopContext::new();
        tracing::info!(target: "strategy", network = self.profile.name, "Strategy loop started");

        loop {
            let header = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "strategy", "Shutdown requested; strategy loop exiting");
                    return Ok(());
                }
                received = block_rx.recv() => match received {
                    Ok(header) => header,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(target: "strategy", skipped, "Dropped stale block events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!(target: "strategy", "Block stream closed");
                        return Ok(());
                    }
                }
            };

            // Blocks that arrived while we were busy are stale; keep the newest.
            let mut header = header;
            while let Ok(next) = block_rx.try_recv() {
                header = next;
            }

            let block = header.inner.number;
            if let Err(e) = self.handle_block(&mut ctx, block).await {
                tracing::error!(target: "strategy", block, error = %e, "Block handler failed");
                self.audit
                    .record(block, AuditKind::Error, 0.0, 0, &e.to_string());
                self.supervisor.report_instability(&e).await;
            }
        }
    }

    async fn handle_block(&self, ctx: &mut LoopContext, block: u64) -> Result<(), AppError> {
        if ctx.mode == OperatingMode::Safe {
            if block % SAFE_MODE_LOG_EVERY_BLOCKS == 0 {
                tracing::info!(target: "strategy", block, "Safe mode: observing only");
            }
            return Ok(());
        }
        if ctx.is_processing {
            return Ok(());
        }
        if let Some(last) = ctx.last_run
            && last.elapsed() < Duration::from_millis(MIN_LOOP_INTERVAL_MS)
        {
            return Ok(());
        }

        ctx.is_processing = true;
        let result = self.process_block(ctx, block).await;
        ctx.is_processing = false;
        ctx.last_run = Some(Instant::now());
        result
    }

    async fn process_block(&self, ctx: &mut LoopContext, block: u64) -> Result<(), AppError> {
        let state = self.store.load();
        let pool = self.actions.pool_snapshot().await?;

        let position = if state.has_position() {
            match U256::from_str(&state.token_id) {
                Ok(token_id) => Some(self.actions.read_position(token_id).await?),
                Err(e) => {
                    // Corrupt state degrades to "no position"; the orphan
                    // scan re-adopts anything real on chain.
                    tracing::warn!(target: "strategy", token_id = %state.token_id, error = %e, "Unreadable tokenId; resetting state");
                    self.store.save("0")?;
                    let client = self.supervisor.current_client().await;
                    self.store
                        .scan_orphans(&client, self.profile.position_manager, self.actions.wallet())
                        .await?;
                    return Ok(());
                }
            }
        } else {
            None
        };

        let equity = compute_equity(&self.actions, &pool, position.as_ref()).await?;
        self.audit.record(
            block,
            AuditKind::StrategyMetrics,
            equity.price_usd_per_weth,
            pool.tick,
            &format!(
                "equity={:.2} wallet_weth={:.6} wallet_usdc={:.2} position_weth={:.6} position_usdc={:.2} fees_weth={:.6} fees_usdc={:.2}",
                equity.total_usd,
                equity.wallet_weth,
                equity.wallet_usdc,
                equity.position_weth,
                equity.position_usdc,
                equity.pending_fees_weth,
                equity.pending_fees_usdc,
            ),
        );

        // Hard equity stop is absorbing: exit everything and latch SAFE.
        if equity.total_usd < self.hard_stop_loss_usd {
            return self.hard_stop(ctx, block, position.as_ref(), equity.total_usd).await;
        }

        let Some(position) = position else {
            // Entry. A pipeline abort here is a market-stability retry, not
            // a fault: persisted state stays "0" and the next block tries
            // again.
            if let Err(e) = self.pipeline.execute_full_rebalance(U256::ZERO, block).await {
                tracing::warn!(target: "strategy", block, error = %e, "Entry attempt aborted");
                self.supervisor.report_instability(&e).await;
            }
            return Ok(());
        };

        // Closed externally (transfer, forced close): adopt any orphan or
        // reset and re-enter next block.
        if position.liquidity == 0 {
            tracing::warn!(
                target: "strategy",
                token_id = %position.token_id,
                "Position has no liquidity on chain; reconciling"
            );
            self.store.save("0")?;
            let client = self.supervisor.current_client().await;
            let adopted = self
                .store
                .scan_orphans(&client, self.profile.position_manager, self.actions.wallet())
                .await?;
            self.audit.record(
                block,
                AuditKind::Info,
                equity.price_usd_per_weth,
                pool.tick,
                &match adopted {
                    Some(id) => format!("position closed externally; adopted orphan {id}"),
                    None => "position closed externally; state reset".to_string(),
                },
            );
            return Ok(());
        }

        let width = position.width();
        let distance = (pool.tick - position.center()).abs();

        // Circuit breaker: price ran unusually far from the position
        // center. Exit to stable but stay in NORMAL mode so the loop can
        // re-enter when conditions settle.
        if f64::from(distance) > f64::from(width) * CIRCUIT_BREAKER_DEVIATION_FACTOR {
            return self.circuit_break(block, &position, distance, equity.price_usd_per_weth, pool.tick).await;
        }

        // Dynamic hysteresis: ATR refreshed at most every 5 minutes.
        if ctx
            .last_atr_update
            .map(|t| t.elapsed() >= Duration::from_secs(ATR_CACHE_SECS))
            .unwrap_or(true)
        {
            match self.market.atr(&self.analytics_interval, ATR_PERIOD).await {
                Ok(atr) => {
                    ctx.cached_atr = Some(atr);
                    ctx.last_atr_update = Some(Instant::now());
                }
                Err(e) => {
                    tracing::warn!(target: "strategy", error = %e, "ATR refresh failed; holding");
                }
            }
        }
        let Some(atr) = ctx.cached_atr else {
            return Ok(());
        };

        let factor = buffer_factor(atr, equity.price_usd_per_weth);
        let buffer_ticks = (f64::from(width) * factor).floor() as i32;
        let out_of_band = pool.tick < position.tick_lower - buffer_ticks
            || pool.tick > position.tick_upper + buffer_ticks;

        if out_of_band {
            tracing::info!(
                target: "strategy",
                block,
                tick = pool.tick,
                tick_lower = position.tick_lower,
                tick_upper = position.tick_upper,
                buffer_ticks,
                "Out of buffered range; rebalancing"
            );
            if let Err(e) = self
                .pipeline
                .execute_full_rebalance(position.token_id, block)
                .await
            {
                tracing::warn!(target: "strategy", block, error = %e, "Rebalance aborted");
                self.supervisor.report_instability(&e).await;
            }
        } else {
            tracing::debug!(
                target: "strategy",
                block,
                tick = pool.tick,
                buffer_ticks,
                "In range; holding"
            );
        }
        Ok(())
    }

    async fn hard_stop(
        &self,
        ctx: &mut LoopContext,
        block: u64,
        position: Option<&PositionInfo>,
        total_usd: f64,
    ) -> Result<(), AppError> {
        tracing::error!(
            target: "strategy",
            block,
            total_usd,
            threshold = self.hard_stop_loss_usd,
            "HARD EQUITY STOP"
        );
        if let Some(position) = position {
            self.actions.atomic_exit(position.token_id).await?;
            self.actions.sweep_to_stable().await?;
            self.store.save("0")?;
        }
        ctx.mode = OperatingMode::Safe;
        self.audit.record(
            block,
            AuditKind::StopLoss,
            0.0,
            0,
            &format!(
                "hard equity stop: {:.2} < {:.2}; safe mode latched",
                total_usd, self.hard_stop_loss_usd
            ),
        );
        self.mailer
            .send(
                "HARD STOP - safe mode latched",
                &format!(
                    "Equity {:.2} USD fell below {:.2} USD. All funds swept to stable.\n\
                     The agent is observation-only until restarted.",
                    total_usd, self.hard_stop_loss_usd
                ),
            )
            .await;
        Ok(())
    }

    async fn circuit_break(
        &self,
        block: u64,
        position: &PositionInfo,
        distance: i32,
        price: f64,
        tick: i32,
    ) -> Result<(), AppError> {
        tracing::warn!(
            target: "strategy",
            block,
            distance,
            width = position.width(),
            "Circuit breaker: exiting to stable"
        );
        self.actions.atomic_exit(position.token_id).await?;
        self.actions.sweep_to_stable().await?;
        self.store.save("0")?;
        self.audit.record(
            block,
            AuditKind::StopLoss,
            price,
            tick,
            &format!(
                "circuit breaker: distance {distance} > width {} x {CIRCUIT_BREAKER_DEVIATION_FACTOR}; swept to stable",
                position.width()
            ),
        );
        self.mailer
            .send(
                "Circuit breaker tripped",
                &format!(
                    "Price moved {distance} ticks from the position center (width {}).\n\
                     Position {} exited and swept to stable; re-entry on a later block.",
                    position.width(),
                    position.token_id
                ),
            )
            .await;
        Ok(())
    }
}
