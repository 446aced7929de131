// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use oxidity_ranger::app::config::GlobalSettings;
use oxidity_ranger::app::logging::setup_logging;
use oxidity_ranger::common::data_path::resolve_data_path;
use oxidity_ranger::domain::error::AppError;
use oxidity_ranger::infrastructure::data::audit_log::AuditLog;
use oxidity_ranger::infrastructure::data::market_data::MarketDataClient;
use oxidity_ranger::infrastructure::data::state_store::StateStore;
use oxidity_ranger::infrastructure::network::supervisor::EndpointSupervisor;
use oxidity_ranger::services::strategy::actions::ActionExecutor;
use oxidity_ranger::services::strategy::alerts::Mailer;
use oxidity_ranger::services::strategy::engine::Engine;
use oxidity_ranger::services::strategy::pipeline::RebalancePipeline;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Oxidity Ranger - autonomous Uniswap v3 range keeper")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let profile = settings.profile();
    tracing::info!(
        network = profile.name,
        chain_id = profile.chain_id,
        pool = %profile.pool,
        "Starting range keeper"
    );

    let signer = PrivateKeySigner::from_str(settings.private_key.trim())
        .map_err(|e| AppError::Config(format!("PRIVATE_KEY: {e}")))?;
    let supervisor = EndpointSupervisor::connect(settings.endpoints(), signer).await?;
    tracing::info!(wallet = %supervisor.wallet_address(), "Operator wallet ready");

    let actions = Arc::new(ActionExecutor::initialize(Arc::clone(&supervisor), profile).await?);
    let market = MarketDataClient::new()?;
    let store = Arc::new(StateStore::new(resolve_data_path(
        &settings.state_file,
        settings.data_dir.as_deref(),
    )));
    let audit = Arc::new(AuditLog::open(resolve_data_path(
        &settings.audit_file,
        settings.data_dir.as_deref(),
    ))?);
    let mailer = Arc::new(Mailer::from_settings(&settings));

    // A crash between mint and save leaves an on-chain position with no
    // local record; reconcile before the first block.
    let client = supervisor.current_client().await;
    if let Some(token_id) = store
        .scan_orphans(&client, profile.position_manager, supervisor.wallet_address())
        .await?
    {
        tracing::info!(%token_id, "Recovered position from orphan scan");
    }

    let pipeline = RebalancePipeline::new(
        Arc::clone(&actions),
        market.clone(),
        Arc::clone(&store),
        Arc::clone(&audit),
        Arc::clone(&mailer),
        settings.analytics_interval.clone(),
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; shutting down between blocks");
                shutdown.cancel();
            }
        });
    }

    let engine = Engine::new(
        supervisor,
        profile,
        actions,
        market,
        pipeline,
        store,
        audit,
        mailer,
        settings.hard_stop_loss_usd,
        settings.analytics_interval.clone(),
        shutdown,
    );
    engine.run().await
}
