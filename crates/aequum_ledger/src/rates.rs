//! Exchange-rate providers. The ledger takes a `RateProvider` as an injected
//! dependency; the default implementation keeps a 24h TTL cache over a single
//! live-fetch attempt and falls back to a static table when no API is
//! configured or the fetch fails. Rate failures never propagate to callers.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::currency::{Currency, RateTable};

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("reqwest client")
});

static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
});

/// Static table used when no live source is available. Base USD.
pub static FALLBACK_RATES: Lazy<RateTable> = Lazy::new(|| {
    RateTable::new(Currency::USD)
        .with_rate(Currency::EUR, 0.92)
        .with_rate(Currency::GBP, 0.79)
        .with_rate(Currency::CAD, 1.36)
        .with_rate(Currency::AUD, 1.52)
        .with_rate(Currency::INR, 83.10)
        .with_rate(Currency::JPY, 147.0)
});

/// Source of the rate table used for new transaction snapshots.
/// Implementations must always return a usable table; degraded quality is
/// reflected in the data, not in control flow.
pub trait RateProvider {
    fn current_rates(&self) -> RateTable;
}

/// Fixed table, for tests and as the fallback of last resort.
#[derive(Clone, Debug)]
pub struct StaticRates(pub RateTable);

impl RateProvider for StaticRates {
    fn current_rates(&self) -> RateTable {
        self.0.clone()
    }
}

#[derive(Clone, Debug)]
pub struct RateProviderConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub ttl: Duration,
}

impl RateProviderConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("AEQUUM_RATE_API_URL").ok(),
            api_key: std::env::var("AEQUUM_RATE_API_KEY").ok(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedRates {
    rates: RateTable,
    obtained_at: DateTime<Utc>,
}

/// TTL-cached provider over an HTTP rate API. One fetch attempt per lookup:
/// a failed fetch falls back once to the last cached value, then to the
/// hardcoded table.
pub struct CachedRateProvider {
    config: RateProviderConfig,
    cache: Mutex<Option<CachedRates>>,
}

#[derive(serde::Deserialize)]
struct RateResponse {
    base: String,
    rates: std::collections::HashMap<String, f64>,
}

impl CachedRateProvider {
    pub fn new(config: RateProviderConfig) -> Self {
        Self { config, cache: Mutex::new(None) }
    }

    pub fn from_env() -> Self {
        Self::new(RateProviderConfig::from_env())
    }

    /// Cached table if one exists and is younger than the TTL.
    fn cached_rates(&self) -> Option<RateTable> {
        let guard = self.cache.lock().unwrap();
        let cached = guard.as_ref()?;
        let age = Utc::now().signed_duration_since(cached.obtained_at);
        if age.to_std().map(|a| a < self.config.ttl).unwrap_or(false) {
            Some(cached.rates.clone())
        } else {
            None
        }
    }

    /// Last cached table regardless of age.
    fn stale_rates(&self) -> Option<RateTable> {
        self.cache.lock().unwrap().as_ref().map(|c| c.rates.clone())
    }

    fn fetch_fresh_rates(&self) -> AnyResult<RateTable> {
        let url = self
            .config
            .api_url
            .as_deref()
            .context("no rate API configured")?;
        let mut request = CLIENT.get(url);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.query(&[("apikey", key)]);
        }
        let response: RateResponse = RUNTIME.block_on(async {
            let resp = request.send().await.context("rate fetch failed")?;
            let resp = resp.error_for_status().context("rate API returned error status")?;
            resp.json().await.context("rate response was not valid JSON")
        })?;

        let base = Currency::from_str(&response.base)
            .with_context(|| format!("unknown base currency {}", response.base))?;
        let mut table = RateTable::new(base);
        for (code, rate) in response.rates {
            // Unknown codes in the response are skipped, not errors.
            if let Some(currency) = Currency::from_str(&code) {
                table.rates.insert(currency, rate);
            }
        }
        let mut guard = self.cache.lock().unwrap();
        *guard = Some(CachedRates { rates: table.clone(), obtained_at: Utc::now() });
        Ok(table)
    }
}

impl RateProvider for CachedRateProvider {
    fn current_rates(&self) -> RateTable {
        if let Some(rates) = self.cached_rates() {
            return rates;
        }
        match self.fetch_fresh_rates() {
            Ok(rates) => rates,
            Err(e) => {
                tracing::warn!("live rate fetch unavailable: {:#}", e);
                self.stale_rates().unwrap_or_else(|| FALLBACK_RATES.clone())
            }
        }
    }
}
