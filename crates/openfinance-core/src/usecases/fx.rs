//! FX Quoting/Dealing (C10.3, §4.5.3).

use crate::domain::events::DomainEvent;
use crate::domain::fx::{round_half_up, FxDeal, FxQuote, FxQuoteStatus};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::{BusPort, CachePort, FxPort, IdempotencyPort, IdempotencyRecord, RatePort};
use crate::settings::PlatformSettings;
use crate::usecases::check_idempotency;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const SCOPE_FX_DEAL: &str = "fx:deal";

#[allow(clippy::too_many_arguments)]
pub async fn create_quote(
    fx_port: &dyn FxPort,
    idempotency_port: &dyn IdempotencyPort,
    bus: &dyn BusPort,
    rate_port: &dyn RatePort,
    participant_id: &str,
    idempotency_key: &str,
    request_hash: &str,
    source_currency: &str,
    target_currency: &str,
    source_amount: f64,
    settings: &PlatformSettings,
    now: DateTime<Utc>,
) -> PlatformResult<FxQuote> {
    if let Some(existing) =
        check_idempotency(idempotency_port, idempotency_key, participant_id, request_hash).await?
    {
        return fx_port
            .load_quote(&existing.resource_id)
            .await?
            .ok_or_else(|| PlatformError::fatal("idempotency record references a missing quote"));
    }

    let rate = rate_port
        .rate(source_currency, target_currency)
        .await?
        .ok_or_else(|| PlatformError::business_rule("MARKET_CLOSED", "no market rate available for this pair"))?;
    let rate = round_half_up(rate, settings.fx_rate_scale);
    let target_amount = round_half_up(source_amount * rate, 2);

    let quote = FxQuote {
        quote_id: Uuid::new_v4().to_string(),
        participant_id: participant_id.to_string(),
        source_currency: source_currency.to_string(),
        target_currency: target_currency.to_string(),
        source_amount,
        target_amount,
        exchange_rate: rate,
        status: FxQuoteStatus::Quoted,
        created_at: now,
        expires_at: now + chrono::Duration::seconds(settings.fx_quote_ttl_seconds),
    };
    fx_port.save_quote(&quote).await?;

    idempotency_port
        .set_if_absent(IdempotencyRecord {
            idempotency_key: idempotency_key.to_string(),
            participant_id: participant_id.to_string(),
            request_hash: request_hash.to_string(),
            resource_id: quote.quote_id.clone(),
            status: "QUOTED".to_string(),
            expires_at: now + chrono::Duration::seconds(settings.idempotency_default_ttl_seconds),
        })
        .await?;

    bus.publish(DomainEvent::new(
        quote.quote_id.clone(),
        "FxQuote",
        1,
        "QuoteCreatedEvent",
        1,
        participant_id,
        None,
        serde_json::json!({
            "sourceCurrency": source_currency,
            "targetCurrency": target_currency,
            "sourceAmount": source_amount,
            "targetAmount": target_amount,
            "exchangeRate": rate,
        }),
    ))
    .await?;

    Ok(quote)
}

pub async fn execute_deal(
    fx_port: &dyn FxPort,
    idempotency_port: &dyn IdempotencyPort,
    bus: &dyn BusPort,
    quote_id: &str,
    participant_id: &str,
    idempotency_key: &str,
    request_hash: &str,
    settings: &PlatformSettings,
    now: DateTime<Utc>,
) -> PlatformResult<FxDeal> {
    if let Some(existing) =
        check_idempotency(idempotency_port, idempotency_key, participant_id, request_hash).await?
    {
        return fx_port
            .load_deal(&existing.resource_id)
            .await?
            .ok_or_else(|| PlatformError::fatal("idempotency record references a missing deal"));
    }

    let mut quote = fx_port
        .load_quote(quote_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("quote '{quote_id}' not found")))?;

    if quote.status == FxQuoteStatus::Booked {
        return Err(PlatformError::business_rule("QUOTE_ALREADY_FINALIZED", "quote has already been booked"));
    }
    if quote.lazily_expire(now) || quote.status == FxQuoteStatus::Expired {
        fx_port.save_quote(&quote).await?;
        return Err(PlatformError::business_rule("QUOTE_EXPIRED", "quote has expired"));
    }

    quote.status = FxQuoteStatus::Booked;
    fx_port.save_quote(&quote).await?;

    let deal = FxDeal {
        deal_id: Uuid::new_v4().to_string(),
        quote_id: quote.quote_id.clone(),
        participant_id: participant_id.to_string(),
        source_currency: quote.source_currency.clone(),
        target_currency: quote.target_currency.clone(),
        source_amount: quote.source_amount,
        target_amount: quote.target_amount,
        exchange_rate: quote.exchange_rate,
        created_at: now,
    };
    fx_port.save_deal(&deal).await?;

    idempotency_port
        .set_if_absent(IdempotencyRecord {
            idempotency_key: idempotency_key.to_string(),
            participant_id: participant_id.to_string(),
            request_hash: request_hash.to_string(),
            resource_id: deal.deal_id.clone(),
            status: "BOOKED".to_string(),
            expires_at: now + chrono::Duration::seconds(settings.idempotency_default_ttl_seconds),
        })
        .await?;

    bus.publish(DomainEvent::new(
        deal.deal_id.clone(),
        "FxDeal",
        1,
        "DealBookedEvent",
        1,
        participant_id,
        None,
        serde_json::json!({
            "quoteId": deal.quote_id,
            "sourceAmount": deal.source_amount,
            "targetAmount": deal.target_amount,
        }),
    ))
    .await?;

    Ok(deal)
}

/// Cache-through quote read; lazily transitions QUOTED -> EXPIRED past TTL.
pub async fn get_quote(
    fx_port: &dyn FxPort,
    cache: &dyn CachePort,
    quote_id: &str,
    participant_id: &str,
    now: DateTime<Utc>,
) -> PlatformResult<FxQuote> {
    let cache_key = format!("fx-quote:{participant_id}:{quote_id}");
    if let Some(cached) = cache.get(&cache_key).await? {
        if let Ok(quote) = serde_json::from_str::<FxQuote>(&cached) {
            if !quote.is_expired(now) {
                return Ok(quote);
            }
        }
    }

    let mut quote = fx_port
        .load_quote(quote_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("quote '{quote_id}' not found")))?;
    if quote.lazily_expire(now) {
        fx_port.save_quote(&quote).await?;
    }

    let serialized =
        serde_json::to_string(&quote).map_err(|e| PlatformError::fatal(format!("failed to serialize quote: {e}")))?;
    cache.put(&cache_key, serialized, chrono::Duration::seconds(30)).await?;
    Ok(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFxPort {
        quotes: Mutex<HashMap<String, FxQuote>>,
        deals: Mutex<HashMap<String, FxDeal>>,
    }

    #[async_trait]
    impl FxPort for FakeFxPort {
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

    #[derive(Default)]
    struct FakeIdempotencyPort {
        records: Mutex<HashMap<(String, String), IdempotencyRecord>>,
    }

    #[async_trait]
    impl IdempotencyPort for FakeIdempotencyPort {
        async fn set_if_absent(&self, record: IdempotencyRecord) -> PlatformResult<Option<IdempotencyRecord>> {
            let key = (record.idempotency_key.clone(), record.participant_id.clone());
            let mut records = self.records.lock().unwrap();
            if let Some(existing) = records.get(&key) {
                return Ok(Some(existing.clone()));
            }
            records.insert(key, record);
            Ok(None)
        }
        async fn get(&self, idempotency_key: &str, participant_id: &str) -> PlatformResult<Option<IdempotencyRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(idempotency_key.to_string(), participant_id.to_string()))
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeBusPort {
        published: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl BusPort for FakeBusPort {
        async fn publish(&self, event: DomainEvent) -> PlatformResult<()> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCachePort {
        store: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CachePort for FakeCachePort {
        async fn get(&self, key: &str) -> PlatformResult<Option<String>> {
            Ok(self.store.lock().unwrap().get(key).cloned())
        }
        async fn put(&self, key: &str, value: String, _ttl: chrono::Duration) -> PlatformResult<()> {
            self.store.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn set_if_absent(&self, key: &str, value: String, _ttl: chrono::Duration) -> PlatformResult<bool> {
            let mut store = self.store.lock().unwrap();
            if store.contains_key(key) {
                Ok(false)
            } else {
                store.insert(key.to_string(), value);
                Ok(true)
            }
        }
    }

    struct FixedRatePort(Option<f64>);

    #[async_trait]
    impl RatePort for FixedRatePort {
        async fn rate(&self, _source_currency: &str, _target_currency: &str) -> PlatformResult<Option<f64>> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn create_quote_matches_scenario_s3_rounding() {
        let fx_port = FakeFxPort::default();
        let idempotency_port = FakeIdempotencyPort::default();
        let bus = FakeBusPort::default();
        let rate_port = FixedRatePort(Some(0.9));
        let settings = PlatformSettings::default();

        let quote = create_quote(
            &fx_port, &idempotency_port, &bus, &rate_port,
            "tpp-1", "idem-1", "hash-1", "USD", "EUR", 100.0, &settings, Utc::now(),
        ).await.unwrap();

        assert_eq!(quote.target_amount, 90.0);
        assert_eq!(quote.status, FxQuoteStatus::Quoted);
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_quote_fails_when_market_closed() {
        let fx_port = FakeFxPort::default();
        let idempotency_port = FakeIdempotencyPort::default();
        let bus = FakeBusPort::default();
        let rate_port = FixedRatePort(None);
        let settings = PlatformSettings::default();

        let err = create_quote(
            &fx_port, &idempotency_port, &bus, &rate_port,
            "tpp-1", "idem-2", "hash-2", "USD", "EUR", 100.0, &settings, Utc::now(),
        ).await.unwrap_err();

        assert_eq!(err.error_code(), "MARKET_CLOSED");
    }

    #[tokio::test]
    async fn execute_deal_books_quote_and_emits_event() {
        let fx_port = FakeFxPort::default();
        let idempotency_port = FakeIdempotencyPort::default();
        let bus = FakeBusPort::default();
        let rate_port = FixedRatePort(Some(0.9));
        let settings = PlatformSettings::default();

        let quote = create_quote(
            &fx_port, &idempotency_port, &bus, &rate_port,
            "tpp-1", "idem-3", "hash-3", "USD", "EUR", 100.0, &settings, Utc::now(),
        ).await.unwrap();

        let deal = execute_deal(
            &fx_port, &idempotency_port, &bus,
            &quote.quote_id, "tpp-1", "idem-4", "hash-4", &settings, Utc::now(),
        ).await.unwrap();

        assert_eq!(deal.quote_id, quote.quote_id);
        let booked = fx_port.load_quote(&quote.quote_id).await.unwrap().unwrap();
        assert_eq!(booked.status, FxQuoteStatus::Booked);
        assert_eq!(bus.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn execute_deal_rejects_already_finalized_quote() {
        let fx_port = FakeFxPort::default();
        let idempotency_port = FakeIdempotencyPort::default();
        let bus = FakeBusPort::default();
        let rate_port = FixedRatePort(Some(0.9));
        let settings = PlatformSettings::default();

        let quote = create_quote(
            &fx_port, &idempotency_port, &bus, &rate_port,
            "tpp-1", "idem-5", "hash-5", "USD", "EUR", 100.0, &settings, Utc::now(),
        ).await.unwrap();

        execute_deal(&fx_port, &idempotency_port, &bus, &quote.quote_id, "tpp-1", "idem-6", "hash-6", &settings, Utc::now())
            .await
            .unwrap();

        let err = execute_deal(&fx_port, &idempotency_port, &bus, &quote.quote_id, "tpp-1", "idem-7", "hash-7", &settings, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "QUOTE_ALREADY_FINALIZED");
    }

    #[tokio::test]
    async fn execute_deal_rejects_expired_quote() {
        let fx_port = FakeFxPort::default();
        let idempotency_port = FakeIdempotencyPort::default();
        let bus = FakeBusPort::default();
        let rate_port = FixedRatePort(Some(0.9));
        let mut settings = PlatformSettings::default();
        settings.fx_quote_ttl_seconds = -1;

        let quote = create_quote(
            &fx_port, &idempotency_port, &bus, &rate_port,
            "tpp-1", "idem-8", "hash-8", "USD", "EUR", 100.0, &settings, Utc::now(),
        ).await.unwrap();

        let err = execute_deal(&fx_port, &idempotency_port, &bus, &quote.quote_id, "tpp-1", "idem-9", "hash-9", &settings, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "QUOTE_EXPIRED");
        let reloaded = fx_port.load_quote(&quote.quote_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, FxQuoteStatus::Expired);
    }
}
