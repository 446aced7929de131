// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! One-shot operational exit: close any recorded position, sweep to
//! stable, reset persisted state. For use while the automated loop is
//! stopped.

use alloy::primitives::U256;
use alloy::signers::local::PrivateKeySigner;
use oxidity_ranger::app::config::GlobalSettings;
use oxidity_ranger::app::logging::setup_logging;
use oxidity_ranger::common::data_path::resolve_data_path;
use oxidity_ranger::domain::error::AppError;
use oxidity_ranger::infrastructure::data::state_store::StateStore;
use oxidity_ranger::infrastructure::network::supervisor::EndpointSupervisor;
use oxidity_ranger::services::strategy::actions::ActionExecutor;
use std::str::FromStr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = GlobalSettings::load()?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let profile = settings.profile();
    let signer = PrivateKeySigner::from_str(settings.private_key.trim())
        .map_err(|e| AppError::Config(format!("PRIVATE_KEY: {e}")))?;
    let supervisor = EndpointSupervisor::connect(settings.endpoints(), signer).await?;
    let actions = ActionExecutor::initialize(Arc::clone(&supervisor), profile).await?;
    let store = StateStore::new(resolve_data_path(
        &settings.state_file,
        settings.data_dir.as_deref(),
    ));

    let state = store.load();
    if state.has_position() {
        match U256::from_str(&state.token_id) {
            Ok(token_id) => {
                tracing::info!(%token_id, "Closing recorded position");
                if let Err(e) = actions.atomic_exit(token_id).await {
                    tracing::warn!(error = %e, "Exit failed; continuing with sweep");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, token_id = %state.token_id, "Unreadable tokenId; continuing with sweep");
            }
        }
    } else {
        tracing::info!("No position recorded");
    }

    if let Err(e) = actions.sweep_to_stable().await {
        tracing::warn!(error = %e, "Sweep failed");
    }

    store.save("0")?;
    tracing::info!("Emergency exit complete; state reset");
    Ok(())
}
