use async_trait::async_trait;
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::RatePort;
use std::collections::HashMap;
use std::sync::Mutex;

fn pair_key(source_currency: &str, target_currency: &str) -> String {
    format!("{source_currency}/{target_currency}")
}

/// Fixture FX rate table. `None` for an unseeded pair, matching the "market
/// closed" contract `RatePort::rate` documents.
#[derive(Default)]
pub struct InMemoryRates {
    rates: Mutex<HashMap<String, f64>>,
}

impl InMemoryRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, source_currency: &str, target_currency: &str, rate: f64) {
        self.rates.lock().unwrap().insert(pair_key(source_currency, target_currency), rate);
    }
}

#[async_trait]
impl RatePort for InMemoryRates {
    async fn rate(&self, source_currency: &str, target_currency: &str) -> PlatformResult<Option<f64>> {
        Ok(self.rates.lock().unwrap().get(&pair_key(source_currency, target_currency)).copied())
    }
}
