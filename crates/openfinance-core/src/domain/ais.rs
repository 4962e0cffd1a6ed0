use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub iban: String,
    pub currency: String,
    pub account_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceType {
    Available,
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: String,
    pub balance_type: BalanceType,
    pub amount: f64,
    pub currency: String,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: f64,
    pub currency: String,
    pub booking_date_time: DateTime<Utc>,
    pub status: String,
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
}

/// Clamp a requested page size into `[1, max_page_size]`, defaulting when absent.
pub fn clamp_page_size(requested: Option<u32>, default_page_size: u32, max_page_size: u32) -> u32 {
    requested.unwrap_or(default_page_size).clamp(1, max_page_size)
}
