// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::domain::types::PersistedState;
use crate::infrastructure::network::contracts::PositionManager;
use crate::infrastructure::network::supervisor::ChainClient;
use alloy::primitives::{Address, U256};
use std::fs;
use std::path::{Path, PathBuf};

/// Single-writer JSON store for `{tokenId, lastCheck}`. The file is allowed
/// to lag reality: a crash between mint-success and save is reconciled on
/// the next start by the orphan scan.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absent or malformed state reads as "no position".
    pub fn load(&self) -> PersistedState {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(target: "strategy", error = %e, "State file corrupt, treating as no position");
                    PersistedState::default()
                }
            },
            Err(_) => PersistedState::default(),
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn save(&self, token_id: &str) -> Result<(), AppError> {
        let state = PersistedState {
            token_id: token_id.to_string(),
            last_check: chrono::Utc::now().timestamp_millis(),
        };
        let body = serde_json::to_string_pretty(&state)
            .map_err(|e| AppError::StateCorrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Initialization(format!("create {}: {e}", parent.display())))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| AppError::Initialization(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::Initialization(format!("rename {}: {e}", self.path.display())))?;
        tracing::debug!(target: "strategy", token_id, "State persisted");
        Ok(())
    }

    /// Adopt an on-chain position whose local record was lost. Only runs
    /// when the store says "no position"; ties break to the highest index
    /// (last mint).
    pub async fn scan_orphans(
        &self,
        client: &ChainClient,
        position_manager: Address,
        wallet: Address,
    ) -> Result<Option<U256>, AppError> {
        if self.load().has_position() {
            return Ok(None);
        }

        let npm = PositionManager::new(position_manager, client.clone());
        let held: U256 = npm
            .balanceOf(wallet)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("balanceOf: {e}")))?;
        if held.is_zero() {
            return Ok(None);
        }

        let last_index = held - U256::from(1u8);
        let token_id: U256 = npm
            .tokenOfOwnerByIndex(wallet, last_index)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("tokenOfOwnerByIndex: {e}")))?;
        let position = npm
            .positions(token_id)
            .call()
            .await
            .map_err(|e| AppError::Connection(format!("positions: {e}")))?;

        if position.liquidity == 0 {
            tracing::debug!(target: "strategy", %token_id, "Newest owned NFT has no liquidity; not adopting");
            return Ok(None);
        }

        tracing::info!(target: "strategy", %token_id, "Adopting orphan position");
        self.save(&token_id.to_string())?;
        Ok(Some(token_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> StateStore {
        let dir = std::env::temp_dir().join(format!("ranger-state-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        StateStore::new(dir.join("position_state.json"))
    }

    #[test]
    fn missing_file_reads_as_no_position() {
        let store = temp_store("missing");
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn corrupt_file_reads_as_no_position() {
        let store = temp_store("corrupt");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn save_then_load_round_trips_token_id() {
        let store = temp_store("roundtrip");
        store.save("123456").unwrap();
        let state = store.load();
        assert_eq!(state.token_id, "123456");
        assert!(state.last_check > 0);
        assert!(state.has_position());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let store = temp_store("tmpfile");
        store.save("9").unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
