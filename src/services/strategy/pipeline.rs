// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{
    ATR_PERIOD, POST_SWAP_SYNC_SECS, RSI_PERIOD, TWAP_MAX_DEVIATION_TICKS, TWAP_WINDOW_SECS,
};
use crate::domain::error::AppError;
use crate::domain::types::RangePlan;
use crate::infrastructure::data::audit_log::{AuditKind, AuditLog};
use crate::infrastructure::data::market_data::MarketDataClient;
use crate::infrastructure::data::state_store::StateStore;
use crate::services::strategy::actions::ActionExecutor;
use crate::services::strategy::alerts::Mailer;
use crate::services::strategy::equity;
use crate::services::strategy::planner::compute_range_plan;
use alloy::primitives::U256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Where the pipeline is in its ordered step sequence; every non-idle
/// stage can abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CheckingTwap,
    FetchingData,
    Exiting,
    Swapping,
    WaitSync,
    Minting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::CheckingTwap => "CHECKING_TWAP",
            Stage::FetchingData => "FETCHING_DATA",
            Stage::Exiting => "EXITING",
            Stage::Swapping => "SWAPPING",
            Stage::WaitSync => "WAIT_SYNC",
            Stage::Minting => "MINTING",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RebalanceReport {
    pub old_token_id: U256,
    pub exited_amount0: U256,
    pub exited_amount1: U256,
    pub new_token_id: U256,
    pub plan: RangePlan,
    pub price_usd_per_weth: f64,
    pub total_usd: f64,
}

/// The ordered rebalance sequence: safety gate, analytics, atomic exit,
/// target-ratio swap, sync sleep, mandatory pool re-read, mint. Aborts
/// never leave the pipeline mid-mutation: the worst cases are cash-only
/// (exit or swap done, no mint), which the next block retries as entry.
pub struct RebalancePipeline {
    actions: Arc<ActionExecutor>,
    market: MarketDataClient,
    store: Arc<StateStore>,
    audit: Arc<AuditLog>,
    mailer: Arc<Mailer>,
    analytics_interval: String,
}

impl RebalancePipeline {
    pub fn new(
        actions: Arc<ActionExecutor>,
        market: MarketDataClient,
        store: Arc<StateStore>,
        audit: Arc<AuditLog>,
        mailer: Arc<Mailer>,
        analytics_interval: String,
    ) -> Self {
        Self {
            actions,
            market,
            store,
            audit,
            mailer,
            analytics_interval,
        }
    }

    async fn abort(&self, block: u64, stage: Stage, err: AppError) -> AppError {
        tracing::warn!(target: "pipeline", %stage, error = %err, "Rebalance aborted");
        self.audit.record(
            block,
            AuditKind::Error,
            0.0,
            0,
            &format!("rebalance aborted at {stage}: {err}"),
        );
        self.mailer
            .send(
                "Rebalance aborted",
                &format!("Stage: {stage}\nBlock: {block}\nError: {err}"),
            )
            .await;
        err
    }

    /// Run the full sequence. `old_token_id == 0` means entry (nothing to
    /// exit). On success the new token id is persisted and a portfolio
    /// report emitted.
    pub async fn execute_full_rebalance(
        &self,
        old_token_id: U256,
        block: u64,
    ) -> Result<RebalanceReport, AppError> {
        // 1. Manipulation gate: spot must sit near the 300s average.
        let pool = match self.actions.pool_snapshot().await {
            Ok(pool) => pool,
            Err(e) => return Err(self.abort(block, Stage::CheckingTwap, e).await),
        };
        let twap = match self.actions.twap_tick(TWAP_WINDOW_SECS).await {
            Ok(t) => t,
            Err(e) => return Err(self.abort(block, Stage::CheckingTwap, e).await),
        };
        if (pool.tick - twap).abs() > TWAP_MAX_DEVIATION_TICKS {
            let err = AppError::TwapViolation {
                current_tick: pool.tick,
                twap_tick: twap,
            };
            return Err(self.abort(block, Stage::CheckingTwap, err).await);
        }

        // 2. Analytics; the old position survives any failure here.
        let (atr, rsi) = match tokio::try_join!(
            self.market.atr(&self.analytics_interval, ATR_PERIOD),
            self.market.rsi(&self.analytics_interval, RSI_PERIOD),
        ) {
            Ok(v) => v,
            Err(e) => return Err(self.abort(block, Stage::FetchingData, e).await),
        };

        // 3. Exit the old position atomically.
        let (exited_amount0, exited_amount1) = if old_token_id.is_zero() {
            (U256::ZERO, U256::ZERO)
        } else {
            match self.actions.atomic_exit(old_token_id).await {
                Ok(amounts) => {
                    self.store.save("0")?;
                    amounts
                }
                Err(e) => return Err(self.abort(block, Stage::Exiting, e).await),
            }
        };

        // 4-5. Fresh snapshot, then the range plan for it.
        let pool = match self.actions.pool_snapshot().await {
            Ok(pool) => pool,
            Err(e) => return Err(self.abort(block, Stage::Swapping, e).await),
        };
        let price = pool.price_usd_per_weth();
        let plan = compute_range_plan(pool.tick, pool.tick_spacing, atr, price, rsi);
        tracing::info!(
            target: "pipeline",
            tick = pool.tick,
            tick_lower = plan.tick_lower,
            tick_upper = plan.tick_upper,
            width = plan.width_ticks,
            skew = plan.skew,
            atr,
            rsi,
            "Range planned"
        );

        // 6. Rebalance holdings toward the plan's ideal split.
        if let Err(e) = self
            .actions
            .smart_swap(&pool, plan.tick_lower, plan.tick_upper)
            .await
        {
            return Err(self.abort(block, Stage::Swapping, e).await);
        }

        // 7. Let balance reads on rotating endpoints catch up.
        sleep(Duration::from_secs(POST_SWAP_SYNC_SECS)).await;

        // 8. The swap moved the price; minting against the pre-swap
        // snapshot trips the slippage checks.
        let pool = match self.actions.pool_snapshot().await {
            Ok(pool) => pool,
            Err(e) => return Err(self.abort(block, Stage::Minting, e).await),
        };

        // 9. Mint and persist.
        let new_token_id = match self
            .actions
            .mint_max_liquidity(&pool, plan.tick_lower, plan.tick_upper)
            .await
        {
            Ok(id) => id,
            Err(e) => return Err(self.abort(block, Stage::Minting, e).await),
        };
        if new_token_id.is_zero() {
            self.store.save("0")?;
            let err = AppError::MintRevert("nothing to deposit".to_string());
            return Err(self.abort(block, Stage::Minting, err).await);
        }
        self.store.save(&new_token_id.to_string())?;

        let position = self.actions.read_position(new_token_id).await?;
        let snapshot = equity::compute_equity(&self.actions, &pool, Some(&position)).await?;
        let kind = if old_token_id.is_zero() {
            AuditKind::Entry
        } else {
            AuditKind::Rebalance
        };
        let report = RebalanceReport {
            old_token_id,
            exited_amount0,
            exited_amount1,
            new_token_id,
            plan,
            price_usd_per_weth: snapshot.price_usd_per_weth,
            total_usd: snapshot.total_usd,
        };
        self.audit.record(
            block,
            kind,
            snapshot.price_usd_per_weth,
            pool.tick,
            &format!(
                "token_id={new_token_id} range=[{};{}] skew={} exited0={exited_amount0} exited1={exited_amount1} equity={:.2}",
                plan.tick_lower, plan.tick_upper, plan.skew, snapshot.total_usd
            ),
        );
        self.mailer
            .send(
                if old_token_id.is_zero() {
                    "Position opened"
                } else {
                    "Position rebalanced"
                },
                &format!(
                    "Old position: {old_token_id}\nExited: {exited_amount0} / {exited_amount1}\n\
                     New position: {new_token_id}\nRange: [{}; {}] (skew {})\n\
                     Price: {:.2} USD/WETH\nEquity: {:.2} USD\n\
                     Wallet: {:.6} WETH / {:.2} USDC",
                    plan.tick_lower,
                    plan.tick_upper,
                    plan.skew,
                    snapshot.price_usd_per_weth,
                    snapshot.total_usd,
                    snapshot.wallet_weth,
                    snapshot.wallet_usdc,
                ),
            )
            .await;
        Ok(report)
    }
}
