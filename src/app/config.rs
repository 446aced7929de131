// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::constants;
use crate::domain::error::AppError;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    #[serde(default = "default_network")]
    pub network: String,

    // Identity
    pub private_key: String,

    // Chain access: comma-separated endpoint URLs, order = failover order.
    pub rpc_url: String,

    // Strategy tunables
    #[serde(default = "default_hard_stop")]
    pub hard_stop_loss_usd: f64,
    #[serde(default = "default_interval")]
    pub analytics_interval: String,

    // Persistence
    pub data_dir: Option<String>,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,

    // Mail alerts; all absent => alerts no-op.
    pub email_user: Option<String>,
    pub email_pass: Option<String>,
    pub email_to: Option<String>,
    pub email_service: Option<String>,
}

fn default_debug() -> bool {
    false
}
fn default_network() -> String {
    "TESTNET".to_string()
}
fn default_hard_stop() -> f64 {
    constants::DEFAULT_HARD_STOP_LOSS_USD
}
fn default_interval() -> String {
    constants::DEFAULT_ANALYTICS_INTERVAL.to_string()
}
fn default_state_file() -> String {
    "position_state.json".to_string()
}
fn default_audit_file() -> String {
    "strategy_audit.csv".to_string()
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Environment (and .env) override file values; secrets come from env.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.private_key.trim().is_empty() {
            return Err(AppError::Config("PRIVATE_KEY is missing".to_string()));
        }
        let endpoints = self.endpoints();
        if endpoints.is_empty() {
            return Err(AppError::Config(
                "RPC_URL must contain at least one endpoint".to_string(),
            ));
        }
        for endpoint in &endpoints {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| AppError::Config(format!("Invalid RPC URL '{endpoint}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(AppError::Config(format!(
                    "Unsupported RPC scheme '{}' in '{endpoint}'",
                    parsed.scheme()
                )));
            }
        }
        match self.analytics_interval.as_str() {
            "15m" | "1h" => Ok(()),
            other => Err(AppError::Config(format!(
                "Unsupported ANALYTICS_INTERVAL '{other}' (expected 15m or 1h)"
            ))),
        }
    }

    /// Failover-ordered endpoint list parsed from RPC_URL.
    pub fn endpoints(&self) -> Vec<String> {
        self.rpc_url
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    pub fn profile(&self) -> constants::NetworkProfile {
        constants::profile_for(&self.network)
    }

    pub fn mail_configured(&self) -> bool {
        self.email_user.is_some() && self.email_pass.is_some() && self.email_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(rpc_url: &str) -> GlobalSettings {
        GlobalSettings {
            debug: false,
            network: "MAINNET".into(),
            private_key: "0x01".into(),
            rpc_url: rpc_url.into(),
            hard_stop_loss_usd: 250.0,
            analytics_interval: "15m".into(),
            data_dir: None,
            state_file: default_state_file(),
            audit_file: default_audit_file(),
            email_user: None,
            email_pass: None,
            email_to: None,
            email_service: None,
        }
    }

    #[test]
    fn endpoint_list_splits_and_trims() {
        let s = settings("wss://a.example/ws, https://b.example/rpc ,,https://c.example");
        assert_eq!(
            s.endpoints(),
            vec![
                "wss://a.example/ws".to_string(),
                "https://b.example/rpc".to_string(),
                "https://c.example".to_string(),
            ]
        );
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let s = settings(" , ");
        assert!(matches!(s.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn analytics_interval_is_restricted() {
        let mut s = settings("https://a.example");
        s.analytics_interval = "5m".into();
        assert!(matches!(s.validate(), Err(AppError::Config(_))));
    }
}
