// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::PendingTransactionBuilder;
use alloy::rpc::types::TransactionReceipt;
use std::time::Duration;
use tokio::time::timeout;

/// Race the receipt against a deadline. On timeout the tx may still land;
/// callers must re-read chain state instead of assuming failure.
pub async fn wait_for_confirmation(
    pending: PendingTransactionBuilder<Ethereum>,
    timeout_ms: u64,
) -> Result<TransactionReceipt, AppError> {
    let hash = *pending.tx_hash();
    match timeout(Duration::from_millis(timeout_ms), pending.get_receipt()).await {
        Err(_) => {
            tracing::warn!(target: "rpc", %hash, timeout_ms, "Confirmation deadline exceeded");
            Err(AppError::TxTimeout { timeout_ms })
        }
        Ok(Err(e)) => Err(AppError::Transaction {
            hash: hash.to_string(),
            reason: e.to_string(),
        }),
        Ok(Ok(receipt)) => {
            if receipt.status() {
                tracing::debug!(target: "rpc", %hash, block = ?receipt.block_number, "Confirmed");
                Ok(receipt)
            } else {
                Err(AppError::Transaction {
                    hash: hash.to_string(),
                    reason: "reverted".to_string(),
                })
            }
        }
    }
}
