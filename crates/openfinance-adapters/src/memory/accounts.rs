use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openfinance_core::domain::ais::{Account, Balance, Transaction};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::AccountsPort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixture core-banking ledger view behind AIS (§4.5.1). The platform does not
/// own this data; a production adapter calls out to the bank's ledger of
/// record, this one seeds it directly for tests and local runs.
#[derive(Default)]
pub struct InMemoryAccounts {
    owned_by: Mutex<HashMap<(String, String), Vec<String>>>,
    accounts: Mutex<HashMap<String, Account>>,
    balances: Mutex<HashMap<String, Vec<Balance>>>,
    transactions: Mutex<HashMap<String, Vec<Transaction>>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, participant_id: &str, customer_id: &str, account: Account) {
        self.owned_by
            .lock()
            .unwrap()
            .entry((participant_id.to_string(), customer_id.to_string()))
            .or_default()
            .push(account.account_id.clone());
        self.accounts.lock().unwrap().insert(account.account_id.clone(), account);
    }

    pub fn seed_balance(&self, balance: Balance) {
        self.balances.lock().unwrap().entry(balance.account_id.clone()).or_default().push(balance);
    }

    pub fn seed_transaction(&self, transaction: Transaction) {
        self.transactions
            .lock()
            .unwrap()
            .entry(transaction.account_id.clone())
            .or_default()
            .push(transaction);
    }
}

#[async_trait]
impl AccountsPort for InMemoryAccounts {
    async fn list_accounts(&self, participant_id: &str, customer_id: &str) -> PlatformResult<Vec<Account>> {
        let owned_by = self.owned_by.lock().unwrap();
        let accounts = self.accounts.lock().unwrap();
        Ok(owned_by
            .get(&(participant_id.to_string(), customer_id.to_string()))
            .map(|ids| ids.iter().filter_map(|id| accounts.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn get_account(&self, account_id: &str) -> PlatformResult<Option<Account>> {
        Ok(self.accounts.lock().unwrap().get(account_id).cloned())
    }

    async fn get_balances(&self, account_id: &str) -> PlatformResult<Vec<Balance>> {
        Ok(self.balances.lock().unwrap().get(account_id).cloned().unwrap_or_default())
    }

    async fn get_transactions(
        &self,
        account_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> PlatformResult<Vec<Transaction>> {
        let transactions = self.transactions.lock().unwrap();
        Ok(transactions
            .get(account_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|tx| match from {
                        Some(from) => tx.booking_date_time >= from,
                        None => true,
                    })
                    .filter(|tx| match to {
                        Some(to) => tx.booking_date_time <= to,
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
