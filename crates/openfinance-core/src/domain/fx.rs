use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxQuoteStatus {
    Quoted,
    Booked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxQuote {
    pub quote_id: String,
    pub participant_id: String,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: f64,
    pub target_amount: f64,
    pub exchange_rate: f64,
    pub status: FxQuoteStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FxQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Lazily transition QUOTED -> EXPIRED on read if past TTL; returns whether it changed.
    pub fn lazily_expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == FxQuoteStatus::Quoted && self.is_expired(now) {
            self.status = FxQuoteStatus::Expired;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxDeal {
    pub deal_id: String,
    pub quote_id: String,
    pub participant_id: String,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: f64,
    pub target_amount: f64,
    pub exchange_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Round `value` to `places` decimal digits using HALF_UP (round-half-away-from-zero
/// for the non-negative amounts this platform deals in).
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_up_rounding_matches_scenario_s3() {
        let target = round_half_up(100.0 * 0.9, 2);
        assert_eq!(target, 90.0);
        let rate = round_half_up(0.9000004, 6);
        assert_eq!(rate, 0.900000);
    }

    #[test]
    fn half_up_rounds_to_two_places() {
        assert_eq!(round_half_up(33.333, 2), 33.33);
        assert_eq!(round_half_up(0.125, 2), 0.13);
    }

    #[test]
    fn lazily_expires_past_ttl() {
        let mut quote = FxQuote {
            quote_id: "q1".to_string(),
            participant_id: "p1".to_string(),
            source_currency: "USD".to_string(),
            target_currency: "EUR".to_string(),
            source_amount: 100.0,
            target_amount: 90.0,
            exchange_rate: 0.9,
            status: FxQuoteStatus::Quoted,
            created_at: Utc::now() - chrono::Duration::seconds(200),
            expires_at: Utc::now() - chrono::Duration::seconds(80),
        };
        assert!(quote.lazily_expire(Utc::now()));
        assert_eq!(quote.status, FxQuoteStatus::Expired);
    }
}
