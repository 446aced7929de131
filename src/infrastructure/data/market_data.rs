// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::constants::MARKET_DATA_TIMEOUT_SECS;
use crate::domain::error::AppError;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// OHLC series, oldest first, closed candles only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candles {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

impl Candles {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandleProvider {
    Coinbase,
    Kraken,
    Binance,
}

impl CandleProvider {
    fn name(&self) -> &'static str {
        match self {
            CandleProvider::Coinbase => "coinbase",
            CandleProvider::Kraken => "kraken",
            CandleProvider::Binance => "binance",
        }
    }
}

const PROVIDER_CHAIN: [CandleProvider; 3] = [
    CandleProvider::Coinbase,
    CandleProvider::Kraken,
    CandleProvider::Binance,
];

/// ETH/USD candle source with provider failover. Geo-blocked responses
/// (HTTP 451) advance to the next provider; so does any other failure.
/// Indicator errors always propagate: the strategy never mints on stale
/// or missing analytics.
#[derive(Clone)]
pub struct MarketDataClient {
    http: Client,
}

impl MarketDataClient {
    pub fn new() -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(MARKET_DATA_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Initialization(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch `limit` closed candles at `interval` ("15m" or "1h"). The
    /// newest (possibly still open) bucket is dropped.
    pub async fn candles(&self, interval: &str, limit: usize) -> Result<Candles, AppError> {
        let mut last_err = String::new();
        for provider in PROVIDER_CHAIN {
            match self.fetch(provider, interval, limit + 1).await {
                Ok(mut candles) => {
                    // Discard the in-progress bucket, keep the newest `limit`.
                    candles.high.pop();
                    candles.low.pop();
                    candles.close.pop();
                    let excess = candles.len().saturating_sub(limit);
                    candles.high.drain(..excess);
                    candles.low.drain(..excess);
                    candles.close.drain(..excess);
                    if candles.is_empty() {
                        last_err = format!("{}: empty series", provider.name());
                        continue;
                    }
                    return Ok(candles);
                }
                Err(e) => {
                    tracing::debug!(target: "market", provider = provider.name(), error = %e, "Candle provider failed, advancing");
                    last_err = format!("{}: {e}", provider.name());
                }
            }
        }
        Err(AppError::MarketData(last_err))
    }

    /// Wilder RSI over closed candles; returns the final value.
    pub async fn rsi(&self, interval: &str, period: usize) -> Result<f64, AppError> {
        let candles = self.candles(interval, period * 10).await?;
        rsi_last(&candles.close, period)
    }

    /// Wilder ATR over closed candles, in quote-currency (USD) terms.
    pub async fn atr(&self, interval: &str, period: usize) -> Result<f64, AppError> {
        let candles = self.candles(interval, period * 10).await?;
        atr_last(&candles, period)
    }

    async fn fetch(
        &self,
        provider: CandleProvider,
        interval: &str,
        limit: usize,
    ) -> Result<Candles, AppError> {
        let url = request_url(provider, interval, limit)?;
        let resp = self
            .http
            .get(&url)
            .header("User-Agent", "oxidity-ranger")
            .send()
            .await
            .map_err(|e| AppError::MarketData(e.to_string()))?;

        if resp.status() == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS {
            return Err(AppError::MarketData("geo-blocked (451)".to_string()));
        }
        if !resp.status().is_success() {
            return Err(AppError::MarketData(format!("HTTP {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::MarketData(e.to_string()))?;
        match provider {
            CandleProvider::Coinbase => parse_coinbase(&body),
            CandleProvider::Kraken => parse_kraken(&body),
            CandleProvider::Binance => parse_binance(&body),
        }
    }
}

fn request_url(
    provider: CandleProvider,
    interval: &str,
    limit: usize,
) -> Result<String, AppError> {
    let (coinbase_secs, kraken_mins, binance_tag) = match interval {
        "15m" => (900, 15, "15m"),
        "1h" => (3600, 60, "1h"),
        other => {
            return Err(AppError::MarketData(format!(
                "unsupported interval '{other}'"
            )));
        }
    };
    Ok(match provider {
        CandleProvider::Coinbase => format!(
            "https://api.exchange.coinbase.com/products/ETH-USD/candles?granularity={coinbase_secs}"
        ),
        CandleProvider::Kraken => format!(
            "https://api.kraken.com/0/public/OHLC?pair=ETHUSD&interval={kraken_mins}"
        ),
        CandleProvider::Binance => format!(
            "https://api.binance.com/api/v3/klines?symbol=ETHUSDT&interval={binance_tag}&limit={limit}"
        ),
    })
}

fn f64_at(row: &Value, idx: usize) -> Result<f64, AppError> {
    let cell = row
        .get(idx)
        .ok_or_else(|| AppError::MarketData(format!("missing column {idx}")))?;
    match cell {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::MarketData("non-finite number".to_string())),
        Value::String(s) => s
            .parse()
            .map_err(|_| AppError::MarketData(format!("bad numeric string '{s}'"))),
        other => Err(AppError::MarketData(format!("unexpected cell {other}"))),
    }
}

/// Coinbase: rows of [time, low, high, open, close, volume], newest first.
fn parse_coinbase(body: &Value) -> Result<Candles, AppError> {
    let rows = body
        .as_array()
        .ok_or_else(|| AppError::MarketData("coinbase: not an array".to_string()))?;
    let mut candles = Candles::default();
    for row in rows.iter().rev() {
        candles.low.push(f64_at(row, 1)?);
        candles.high.push(f64_at(row, 2)?);
        candles.close.push(f64_at(row, 4)?);
    }
    Ok(candles)
}

/// Kraken: result map keyed by pair, rows of
/// [time, open, high, low, close, vwap, volume, count], oldest first.
fn parse_kraken(body: &Value) -> Result<Candles, AppError> {
    if let Some(errors) = body.get("error").and_then(Value::as_array)
        && !errors.is_empty()
    {
        return Err(AppError::MarketData(format!("kraken: {errors:?}")));
    }
    let result = body
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::MarketData("kraken: missing result".to_string()))?;
    let rows = result
        .iter()
        .find(|(k, _)| k.as_str() != "last")
        .and_then(|(_, v)| v.as_array())
        .ok_or_else(|| AppError::MarketData("kraken: missing pair rows".to_string()))?;
    let mut candles = Candles::default();
    for row in rows {
        candles.high.push(f64_at(row, 2)?);
        candles.low.push(f64_at(row, 3)?);
        candles.close.push(f64_at(row, 4)?);
    }
    Ok(candles)
}

/// Binance: rows of [openTime, open, high, low, close, ...], oldest first.
fn parse_binance(body: &Value) -> Result<Candles, AppError> {
    let rows = body
        .as_array()
        .ok_or_else(|| AppError::MarketData("binance: not an array".to_string()))?;
    let mut candles = Candles::default();
    for row in rows {
        candles.high.push(f64_at(row, 2)?);
        candles.low.push(f64_at(row, 3)?);
        candles.close.push(f64_at(row, 4)?);
    }
    Ok(candles)
}

/// Wilder-smoothed RSI, final value of the sequence.
pub fn rsi_last(closes: &[f64], period: usize) -> Result<f64, AppError> {
    if closes.len() < period + 1 {
        return Err(AppError::MarketData(format!(
            "need {} closes for RSI, have {}",
            period + 1,
            closes.len()
        )));
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }
    if avg_loss == 0.0 {
        return Ok(100.0);
    }
    let rs = avg_gain / avg_loss;
    Ok(100.0 - 100.0 / (1.0 + rs))
}

/// Wilder-smoothed ATR, final value of the sequence.
pub fn atr_last(candles: &Candles, period: usize) -> Result<f64, AppError> {
    let n = candles.len();
    if n < period + 1 || candles.high.len() != n || candles.low.len() != n {
        return Err(AppError::MarketData(format!(
            "need {} candles for ATR, have {n}",
            period + 1
        )));
    }
    let mut trs = Vec::with_capacity(n - 1);
    for i in 1..n {
        let hl = candles.high[i] - candles.low[i];
        let hc = (candles.high[i] - candles.close[i - 1]).abs();
        let lc = (candles.low[i] - candles.close[i - 1]).abs();
        trs.push(hl.max(hc).max(lc));
    }
    let mut atr = trs[..period].iter().sum::<f64>() / period as f64;
    for tr in &trs[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }
    Ok(atr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rsi_is_100_on_monotonic_rise() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi_last(&closes, 14).unwrap(), 100.0);
    }

    #[test]
    fn rsi_is_50_on_alternating_equal_moves() {
        // +1, -1 alternating: avg gain == avg loss, RSI converges to 50.
        let mut closes = vec![100.0];
        for i in 0..40 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let rsi = rsi_last(&closes, 14).unwrap();
        assert!((rsi - 50.0).abs() < 2.0, "rsi = {rsi}");
    }

    #[test]
    fn rsi_rejects_short_series() {
        let closes = vec![1.0; 10];
        assert!(rsi_last(&closes, 14).is_err());
    }

    #[test]
    fn atr_of_constant_two_dollar_bars_is_two() {
        let n = 40;
        let candles = Candles {
            high: vec![101.0; n],
            low: vec![99.0; n],
            close: vec![100.0; n],
        };
        let atr = atr_last(&candles, 14).unwrap();
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn atr_uses_gaps_against_previous_close() {
        // Second bar gaps up: TR = max(1, |11-5|, |10-5|) = 6.
        let candles = Candles {
            high: vec![6.0, 11.0, 11.0],
            low: vec![4.0, 10.0, 10.0],
            close: vec![5.0, 10.5, 10.5],
        };
        let atr = atr_last(&candles, 2).unwrap();
        assert!((atr - (6.0 + 1.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn coinbase_rows_are_reversed_to_oldest_first() {
        // Newest first on the wire.
        let body = json!([
            [1700000900, 99.0, 101.0, 100.0, 100.5, 12.0],
            [1700000000, 95.0, 98.0, 96.0, 97.0, 10.0]
        ]);
        let candles = parse_coinbase(&body).unwrap();
        assert_eq!(candles.close, vec![97.0, 100.5]);
        assert_eq!(candles.high, vec![98.0, 101.0]);
        assert_eq!(candles.low, vec![95.0, 99.0]);
    }

    #[test]
    fn kraken_rows_parse_strings_and_skip_last_key() {
        let body = json!({
            "error": [],
            "result": {
                "XETHZUSD": [
                    [1700000000, "96.0", "98.0", "95.0", "97.0", "96.5", "10.0", 5],
                    [1700000900, "97.0", "101.0", "99.0", "100.5", "100.0", "12.0", 7]
                ],
                "last": 1700000900
            }
        });
        let candles = parse_kraken(&body).unwrap();
        assert_eq!(candles.close, vec![97.0, 100.5]);
        assert_eq!(candles.high, vec![98.0, 101.0]);
    }

    #[test]
    fn kraken_api_errors_propagate() {
        let body = json!({"error": ["EGeneral:Too many requests"], "result": {}});
        assert!(parse_kraken(&body).is_err());
    }

    #[test]
    fn binance_rows_parse_oldest_first() {
        let body = json!([
            [1700000000000u64, "96.0", "98.0", "95.0", "97.0", "10.0", 1700000899999u64],
            [1700000900000u64, "97.0", "101.0", "99.0", "100.5", "12.0", 1700001799999u64]
        ]);
        let candles = parse_binance(&body).unwrap();
        assert_eq!(candles.close, vec![97.0, 100.5]);
        assert_eq!(candles.low, vec![95.0, 99.0]);
    }

    #[test]
    fn unsupported_interval_is_rejected() {
        assert!(request_url(CandleProvider::Coinbase, "5m", 10).is_err());
    }
}
