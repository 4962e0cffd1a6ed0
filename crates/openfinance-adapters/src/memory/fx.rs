use async_trait::async_trait;
use openfinance_core::domain::fx::{FxDeal, FxQuote};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::FxPort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Plain mutable-record store for FX quotes and booked deals (§4.5.3).
#[derive(Default)]
pub struct InMemoryFx {
    quotes: Mutex<HashMap<String, FxQuote>>,
    deals: Mutex<HashMap<String, FxDeal>>,
}

impl InMemoryFx {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FxPort for InMemoryFx {
    async fn save_quote(&self, quote: &FxQuote) -> PlatformResult<()> {
        self.quotes.lock().unwrap().insert(quote.quote_id.clone(), quote.clone());
        Ok(())
    }

    async fn load_quote(&self, quote_id: &str) -> PlatformResult<Option<FxQuote>> {
        Ok(self.quotes.lock().unwrap().get(quote_id).cloned())
    }

    async fn save_deal(&self, deal: &FxDeal) -> PlatformResult<()> {
        self.deals.lock().unwrap().insert(deal.deal_id.clone(), deal.clone());
        Ok(())
    }

    async fn load_deal(&self, deal_id: &str) -> PlatformResult<Option<FxDeal>> {
        Ok(self.deals.lock().unwrap().get(deal_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use openfinance_core::domain::fx::FxQuoteStatus;

    #[tokio::test]
    async fn round_trips_quotes_and_deals() {
        let store = InMemoryFx::new();
        let quote = FxQuote {
            quote_id: "q1".to_string(),
            participant_id: "p1".to_string(),
            source_currency: "USD".to_string(),
            target_currency: "EUR".to_string(),
            source_amount: 100.0,
            target_amount: 90.0,
            exchange_rate: 0.9,
            status: FxQuoteStatus::Quoted,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(120),
        };
        store.save_quote(&quote).await.unwrap();
        assert!(store.load_quote("q1").await.unwrap().is_some());
        assert!(store.load_deal("d1").await.unwrap().is_none());
    }
}
