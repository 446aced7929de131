// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::retry::with_retry;
use crate::domain::constants::{
    CONFIRMATION_TIMEOUT_MS, NetworkProfile, REBALANCE_THRESHOLD_USDC, REBALANCE_THRESHOLD_WETH,
    SLIPPAGE_TOLERANCE_BPS, TX_DEADLINE_SECS,
};
use crate::domain::error::AppError;
use crate::domain::types::{PoolSnapshot, PositionInfo, TokenRef};
use crate::infrastructure::network::contracts::{
    ERC20, PositionManager, UniV3Pool, UniV3Quoter, UniV3Router,
};
use crate::infrastructure::network::supervisor::{ChainClient, EndpointSupervisor};
use crate::infrastructure::network::tx::wait_for_confirmation;
use crate::services::strategy::position_math::{
    self, from_raw, mint_amounts, sqrt_ratio_from_x96, target_token0_holding, to_raw,
};
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;

fn to_i24(tick: i32) -> Result<I24, AppError> {
    I24::try_from(tick).map_err(|_| AppError::Strategy(format!("tick {tick} outside int24")))
}

fn deadline() -> U256 {
    U256::from(chrono::Utc::now().timestamp() as u64 + TX_DEADLINE_SECS)
}

/// Outcome of one executed swap, in raw units of the traded tokens.
#[derive(Debug, Clone, Copy)]
pub struct SwapSummary {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
}

/// Typed wrappers around every chain mutation the strategy performs, plus
/// the reads they depend on. Clients are fetched from the supervisor per
/// operation so endpoint rotations never strand a cached binding.
pub struct ActionExecutor {
    supervisor: Arc<EndpointSupervisor>,
    profile: NetworkProfile,
    token0: TokenRef,
    token1: TokenRef,
    tick_spacing: i32,
}

impl ActionExecutor {
    /// Samples immutable pool facts (token ordering, decimals, spacing)
    /// once; everything price-dependent is re-read per block.
    pub async fn initialize(
        supervisor: Arc<EndpointSupervisor>,
        profile: NetworkProfile,
    ) -> Result<Self, AppError> {
        let client = supervisor.current_client().await;
        let pool = UniV3Pool::new(profile.pool, client.clone());

        let token0_builder = pool.token0();
        let token1_builder = pool.token1();
        let spacing_builder = pool.tickSpacing();
        let (token0_addr, token1_addr, spacing) = tokio::try_join!(
            token0_builder.call(),
            token1_builder.call(),
            spacing_builder.call(),
        )
        .map_err(|e| AppError::Initialization(format!("pool metadata: {e}")))?;

        let token0 = Self::token_ref(&client, token0_addr, &profile).await?;
        let token1 = Self::token_ref(&client, token1_addr, &profile).await?;
        tracing::info!(
            target: "strategy",
            token0 = %token0.symbol,
            token1 = %token1.symbol,
            spacing = spacing.as_i32(),
            "Pool metadata loaded"
        );

        Ok(Self {
            supervisor,
            profile,
            token0,
            token1,
            tick_spacing: spacing.as_i32(),
        })
    }

    async fn token_ref(
        client: &ChainClient,
        address: Address,
        profile: &NetworkProfile,
    ) -> Result<TokenRef, AppError> {
        let decimals = ERC20::new(address, client.clone())
            .decimals()
            .call()
            .await
            .map_err(|e| AppError::Initialization(format!("decimals({address}): {e}")))?;
        let symbol = if address == profile.weth {
            "WETH"
        } else if address == profile.usdc {
            "USDC"
        } else {
            return Err(AppError::Initialization(format!(
                "pool token {address} is neither configured WETH nor USDC"
            )));
        };
        Ok(TokenRef {
            address,
            decimals,
            symbol: symbol.to_string(),
        })
    }

    pub fn wallet(&self) -> Address {
        self.supervisor.wallet_address()
    }

    pub fn token0(&self) -> &TokenRef {
        &self.token0
    }

    pub fn token1(&self) -> &TokenRef {
        &self.token1
    }

    fn dust_threshold(&self, token: &TokenRef) -> f64 {
        if token.symbol == "WETH" {
            REBALANCE_THRESHOLD_WETH
        } else {
            REBALANCE_THRESHOLD_USDC
        }
    }

    /// Fresh pool sample; slot0 and liquidity are fetched concurrently.
    pub async fn pool_snapshot(&self) -> Result<PoolSnapshot, AppError> {
        let client = self.supervisor.current_client().await;
        let pool = UniV3Pool::new(self.profile.pool, client);
        let slot0_builder = pool.slot0();
        let liquidity_builder = pool.liquidity();
        let (slot0, liquidity) = tokio::try_join!(slot0_builder.call(), liquidity_builder.call())
            .map_err(|e| AppError::Connection(format!("pool refresh: {e}")))?;
        Ok(PoolSnapshot {
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            tick: slot0.tick.as_i32(),
            liquidity,
            tick_spacing: self.tick_spacing,
            token0: self.token0.clone(),
            token1: self.token1.clone(),
        })
    }

    /// 300-second time-weighted average tick from pool observations.
    pub async fn twap_tick(&self, window_secs: u32) -> Result<i32, AppError> {
        let client = self.supervisor.current_client().await;
        let pool = UniV3Pool::new(self.profile.pool, client);
        let obs = pool
            .observe(vec![window_secs, 0])
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("observe: {e}")))?;
        let cumulatives = obs.tickCumulatives;
        if cumulatives.len() != 2 {
            return Err(AppError::Connection("observe returned wrong arity".into()));
        }
        Ok(crate::services::strategy::planner::twap_tick(
            cumulatives[0].as_i64(),
            cumulatives[1].as_i64(),
            window_secs,
        ))
    }

    pub async fn read_position(&self, token_id: U256) -> Result<PositionInfo, AppError> {
        let client = self.supervisor.current_client().await;
        let npm = PositionManager::new(self.profile.position_manager, client);
        let pos = with_retry(
            move |_| {
                let npm = npm.clone();
                async move { npm.positions(token_id).call().await }
            },
            3,
        )
        .await
        .map_err(|e| AppError::Connection(format!("positions({token_id}): {e}")))?;
        Ok(PositionInfo {
            token_id,
            tick_lower: pos.tickLower.as_i32(),
            tick_upper: pos.tickUpper.as_i32(),
            liquidity: pos.liquidity,
            tokens_owed0: pos.tokensOwed0,
            tokens_owed1: pos.tokensOwed1,
        })
    }

    pub async fn erc20_balance(&self, token: Address) -> Result<U256, AppError> {
        let client = self.supervisor.current_client().await;
        let wallet = self.wallet();
        let contract = ERC20::new(token, client);
        let bal = with_retry(
            move |_| {
                let contract = contract.clone();
                async move { contract.balanceOf(wallet).call().await }
            },
            3,
        )
        .await
        .map_err(|e| AppError::Connection(format!("balanceOf({token}): {e}")))?;
        Ok(bal)
    }

    /// Wallet balances of both pool tokens in human units.
    pub async fn wallet_balances(&self) -> Result<(f64, f64), AppError> {
        let (raw0, raw1) = tokio::try_join!(
            self.erc20_balance(self.token0.address),
            self.erc20_balance(self.token1.address),
        )?;
        Ok((
            from_raw(raw0, self.token0.decimals),
            from_raw(raw1, self.token1.decimals),
        ))
    }

    /// Fees claimable right now, via a static collect with max amounts.
    /// The positions() tokensOwed fields lag and are not used for value.
    pub async fn pending_fees(&self, token_id: U256) -> Result<(U256, U256), AppError> {
        let client = self.supervisor.current_client().await;
        let npm = PositionManager::new(self.profile.position_manager, client);
        let collected = npm
            .collect(PositionManager::CollectParams {
                tokenId: token_id,
                recipient: self.wallet(),
                amount0Max: u128::MAX,
                amount1Max: u128::MAX,
            })
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("static collect: {e}")))?;
        Ok((collected.amount0, collected.amount1))
    }

    async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        needed: U256,
    ) -> Result<(), AppError> {
        if needed.is_zero() {
            return Ok(());
        }
        let client = self.supervisor.current_client().await;
        let erc20 = ERC20::new(token, client);
        let current = erc20
            .allowance(self.wallet(), spender)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("allowance({token}): {e}")))?;
        if current >= needed {
            return Ok(());
        }
        tracing::info!(target: "strategy", %token, %spender, "Approving spender");
        let pending = erc20
            .approve(spender, U256::MAX)
            .send()
            .await
            .map_err(|e| AppError::Transaction {
                hash: String::new(),
                reason: format!("approve: {e}"),
            })?;
        wait_for_confirmation(pending, CONFIRMATION_TIMEOUT_MS).await?;
        Ok(())
    }

    /// Close a position in one multicall: decrease (when liquidity remains),
    /// collect everything, burn the NFT. Returns the collected amounts
    /// parsed from the Collect event.
    pub async fn atomic_exit(&self, token_id: U256) -> Result<(U256, U256), AppError> {
        let position = self.read_position(token_id).await?;
        let client = self.supervisor.current_client().await;
        let npm = PositionManager::new(self.profile.position_manager, client);

        let mut calls: Vec<Bytes> = Vec::with_capacity(3);
        if position.liquidity > 0 {
            calls.push(
                PositionManager::decreaseLiquidityCall {
                    params: PositionManager::DecreaseLiquidityParams {
                        tokenId: token_id,
                        liquidity: position.liquidity,
                        amount0Min: U256::ZERO,
                        amount1Min: U256::ZERO,
                        deadline: deadline(),
                    },
                }
                .abi_encode()
                .into(),
            );
        }
        calls.push(
            PositionManager::collectCall {
                params: PositionManager::CollectParams {
                    tokenId: token_id,
                    recipient: self.wallet(),
                    amount0Max: u128::MAX,
                    amount1Max: u128::MAX,
                },
            }
            .abi_encode()
            .into(),
        );
        calls.push(PositionManager::burnCall { tokenId: token_id }.abi_encode().into());

        let pending = npm.multicall(calls).send().await.map_err(|e| {
            AppError::Transaction {
                hash: String::new(),
                reason: format!("exit multicall: {e}"),
            }
        })?;
        let receipt = wait_for_confirmation(pending, CONFIRMATION_TIMEOUT_MS).await?;

        let mut collected = (U256::ZERO, U256::ZERO);
        for log in receipt.logs() {
            if log.address() != self.profile.position_manager {
                continue;
            }
            if let Ok(decoded) = log.log_decode::<PositionManager::Collect>() {
                let ev = decoded.inner.data;
                collected = (ev.amount0, ev.amount1);
            }
        }
        tracing::info!(
            target: "strategy",
            %token_id,
            amount0 = %collected.0,
            amount1 = %collected.1,
            "Position closed"
        );
        Ok(collected)
    }

    /// Swap toward the token split the new range wants at the current
    /// price. Below the per-side dust threshold no swap happens.
    pub async fn smart_swap(
        &self,
        pool: &PoolSnapshot,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Result<Option<SwapSummary>, AppError> {
        let (bal0, bal1) = self.wallet_balances().await?;
        let price0 = pool.price_token0_in_token1();
        if price0 <= 0.0 || !price0.is_finite() {
            return Err(AppError::Strategy("non-positive pool price".to_string()));
        }

        let sqrt_p = sqrt_ratio_from_x96(pool.sqrt_price_x96);
        let target0 = target_token0_holding(
            bal0,
            bal1,
            price0,
            sqrt_p,
            tick_lower,
            tick_upper,
            pool.token0.decimals,
            pool.token1.decimals,
        );

        let diff0 = target0 - bal0;
        if diff0 > 0.0 {
            // Need more token0: sell token1.
            let amount1_in = (diff0 * price0).min(bal1);
            if amount1_in < self.dust_threshold(&self.token1) {
                tracing::debug!(target: "strategy", amount1_in, "Swap below dust threshold, skipping");
                return Ok(None);
            }
            self.execute_swap(&self.token1, &self.token0, amount1_in)
                .await
                .map(Some)
        } else {
            let amount0_in = (-diff0).min(bal0);
            if amount0_in < self.dust_threshold(&self.token0) {
                tracing::debug!(target: "strategy", amount0_in, "Swap below dust threshold, skipping");
                return Ok(None);
            }
            self.execute_swap(&self.token0, &self.token1, amount0_in)
                .await
                .map(Some)
        }
    }

    /// exactInputSingle with a quoter-derived minimum out.
    async fn execute_swap(
        &self,
        token_in: &TokenRef,
        token_out: &TokenRef,
        amount_in_human: f64,
    ) -> Result<SwapSummary, AppError> {
        let amount_in = to_raw(amount_in_human, token_in.decimals);
        if amount_in.is_zero() {
            return Err(AppError::SwapRevert("zero amount in".to_string()));
        }
        self.ensure_allowance(token_in.address, self.profile.swap_router, amount_in)
            .await?;

        let client = self.supervisor.current_client().await;
        let quoter = UniV3Quoter::new(self.profile.quoter, client.clone());
        let quote = quoter
            .quoteExactInputSingle(
                token_in.address,
                token_out.address,
                U24::from(self.profile.pool_fee),
                amount_in,
                alloy::primitives::aliases::U160::ZERO,
            )
            .call()
            .await
            .map_err(|e| AppError::SwapRevert(format!("quote: {e}")))?;
        let amount_out_minimum =
            quote * U256::from(10_000 - SLIPPAGE_TOLERANCE_BPS) / U256::from(10_000u64);

        let router = UniV3Router::new(self.profile.swap_router, client);
        let pending = router
            .exactInputSingle(UniV3Router::ExactInputSingleParams {
                tokenIn: token_in.address,
                tokenOut: token_out.address,
                fee: U24::from(self.profile.pool_fee),
                recipient: self.wallet(),
                deadline: deadline(),
                amountIn: amount_in,
                amountOutMinimum: amount_out_minimum,
                sqrtPriceLimitX96: alloy::primitives::aliases::U160::ZERO,
            })
            .send()
            .await
            .map_err(|e| AppError::SwapRevert(e.to_string()))?;
        wait_for_confirmation(pending, CONFIRMATION_TIMEOUT_MS).await?;

        tracing::info!(
            target: "strategy",
            token_in = %token_in.symbol,
            token_out = %token_out.symbol,
            %amount_in,
            %amount_out_minimum,
            "Swap confirmed"
        );
        Ok(SwapSummary {
            token_in: token_in.address,
            token_out: token_out.address,
            amount_in,
            amount_out_minimum,
        })
    }

    /// Mint with 99% of both wallet balances. Returns U256::ZERO when
    /// there is nothing to deposit.
    pub async fn mint_max_liquidity(
        &self,
        pool: &PoolSnapshot,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Result<U256, AppError> {
        use crate::domain::constants::BALANCE_SAFETY_FACTOR;

        let (raw0, raw1) = tokio::try_join!(
            self.erc20_balance(self.token0.address),
            self.erc20_balance(self.token1.address),
        )?;
        let avail0 = position_math::u256_to_f64(raw0) * BALANCE_SAFETY_FACTOR;
        let avail1 = position_math::u256_to_f64(raw1) * BALANCE_SAFETY_FACTOR;

        let sqrt_p = sqrt_ratio_from_x96(pool.sqrt_price_x96);
        let amounts = mint_amounts(
            sqrt_p,
            tick_lower,
            tick_upper,
            avail0,
            avail1,
            SLIPPAGE_TOLERANCE_BPS,
        );
        if amounts.amount0_desired.is_zero() && amounts.amount1_desired.is_zero() {
            tracing::warn!(target: "strategy", "Nothing to deposit, skipping mint");
            return Ok(U256::ZERO);
        }

        self.ensure_allowance(
            self.token0.address,
            self.profile.position_manager,
            amounts.amount0_desired,
        )
        .await?;
        self.ensure_allowance(
            self.token1.address,
            self.profile.position_manager,
            amounts.amount1_desired,
        )
        .await?;

        let client = self.supervisor.current_client().await;
        let npm = PositionManager::new(self.profile.position_manager, client);
        let pending = npm
            .mint(PositionManager::MintParams {
                token0: self.token0.address,
                token1: self.token1.address,
                fee: U24::from(self.profile.pool_fee),
                tickLower: to_i24(tick_lower)?,
                tickUpper: to_i24(tick_upper)?,
                amount0Desired: amounts.amount0_desired,
                amount1Desired: amounts.amount1_desired,
                amount0Min: amounts.amount0_min,
                amount1Min: amounts.amount1_min,
                recipient: self.wallet(),
                deadline: deadline(),
            })
            .send()
            .await
            .map_err(|e| AppError::MintRevert(e.to_string()))?;
        let receipt = wait_for_confirmation(pending, CONFIRMATION_TIMEOUT_MS).await?;

        let wallet = self.wallet();
        for log in receipt.logs() {
            if log.address() != self.profile.position_manager {
                continue;
            }
            if let Ok(decoded) = log.log_decode::<PositionManager::Transfer>() {
                let ev = decoded.inner.data;
                if ev.to == wallet {
                    tracing::info!(
                        target: "strategy",
                        token_id = %ev.tokenId,
                        tick_lower,
                        tick_upper,
                        "Position minted"
                    );
                    return Ok(ev.tokenId);
                }
            }
        }
        Err(AppError::MintRevert(
            "mint confirmed but no Transfer to wallet found".to_string(),
        ))
    }

    /// Convert the whole WETH balance to USDC, skipped below dust.
    pub async fn sweep_to_stable(&self) -> Result<Option<SwapSummary>, AppError> {
        let (weth, usdc) = if self.token0.symbol == "WETH" {
            (self.token0.clone(), self.token1.clone())
        } else {
            (self.token1.clone(), self.token0.clone())
        };
        let balance = from_raw(self.erc20_balance(weth.address).await?, weth.decimals);
        if balance < REBALANCE_THRESHOLD_WETH {
            tracing::debug!(target: "strategy", balance, "WETH below dust, nothing to sweep");
            return Ok(None);
        }
        self.execute_swap(&weth, &usdc, balance).await.map(Some)
    }
}
