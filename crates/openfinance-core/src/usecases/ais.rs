//! Account Information Services (C10.1, §4.5.1).

use crate::domain::ais::{clamp_page_size, Account, Balance, Transaction, TransactionPage};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::{AccountsPort, ConsentPort};
use crate::settings::PlatformSettings;
use crate::usecases::load_authorized_consent;
use chrono::{DateTime, Utc};

pub const SCOPE_ACCOUNTS_READ: &str = "accounts:read";

pub async fn list_accounts(
    consent_port: &dyn ConsentPort,
    accounts_port: &dyn AccountsPort,
    consent_id: &str,
    participant_id: &str,
    customer_id: &str,
    now: DateTime<Utc>,
) -> PlatformResult<Vec<Account>> {
    let consent =
        load_authorized_consent(consent_port, consent_id, participant_id, SCOPE_ACCOUNTS_READ, now).await?;
    let accounts = accounts_port.list_accounts(participant_id, customer_id).await?;
    Ok(accounts.into_iter().filter(|a| consent.allows_account(&a.account_id)).collect())
}

pub async fn get_account(
    consent_port: &dyn ConsentPort,
    accounts_port: &dyn AccountsPort,
    consent_id: &str,
    participant_id: &str,
    account_id: &str,
    now: DateTime<Utc>,
) -> PlatformResult<Account> {
    let consent =
        load_authorized_consent(consent_port, consent_id, participant_id, SCOPE_ACCOUNTS_READ, now).await?;
    guard_account_in_whitelist(&consent, account_id)?;
    accounts_port
        .get_account(account_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("account '{account_id}' not found")))
}

pub async fn get_balances(
    consent_port: &dyn ConsentPort,
    accounts_port: &dyn AccountsPort,
    consent_id: &str,
    participant_id: &str,
    account_id: &str,
    now: DateTime<Utc>,
) -> PlatformResult<Vec<Balance>> {
    let consent =
        load_authorized_consent(consent_port, consent_id, participant_id, SCOPE_ACCOUNTS_READ, now).await?;
    guard_account_in_whitelist(&consent, account_id)?;
    accounts_port.get_balances(account_id).await
}

#[allow(clippy::too_many_arguments)]
pub async fn get_transactions(
    consent_port: &dyn ConsentPort,
    accounts_port: &dyn AccountsPort,
    consent_id: &str,
    participant_id: &str,
    account_id: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    page: u32,
    page_size: Option<u32>,
    settings: &PlatformSettings,
    now: DateTime<Utc>,
) -> PlatformResult<TransactionPage> {
    let consent =
        load_authorized_consent(consent_port, consent_id, participant_id, SCOPE_ACCOUNTS_READ, now).await?;
    guard_account_in_whitelist(&consent, account_id)?;

    let mut transactions: Vec<Transaction> = accounts_port.get_transactions(account_id, from, to).await?;
    transactions.sort_by(|a, b| b.booking_date_time.cmp(&a.booking_date_time));

    let page = page.max(1);
    let page_size = clamp_page_size(page_size, settings.ais_default_page_size, settings.ais_max_page_size);
    let total = transactions.len();
    let start = ((page - 1) as usize).saturating_mul(page_size as usize);
    let items = transactions.into_iter().skip(start).take(page_size as usize).collect();

    Ok(TransactionPage { items, page, page_size, total })
}

fn guard_account_in_whitelist(consent: &crate::domain::consent::Consent, account_id: &str) -> PlatformResult<()> {
    if consent.allows_account(account_id) {
        Ok(())
    } else {
        Err(PlatformError::authorization("FORBIDDEN", "account is not within the consent's account whitelist"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ais::BalanceType;
    use crate::domain::consent::{AuthorizeContext, ConsentEvent, CreateConsentRequest};
    use crate::domain::consent::Consent;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    struct FakeConsentPort {
        consent: Mutex<Consent>,
    }

    #[async_trait]
    impl ConsentPort for FakeConsentPort {
        async fn load(&self, _consent_id: &str) -> PlatformResult<Consent> {
            Ok(self.consent.lock().unwrap().clone())
        }
        async fn save(&self, consent: &Consent, _new_events: Vec<ConsentEvent>) -> PlatformResult<()> {
            *self.consent.lock().unwrap() = consent.clone();
            Ok(())
        }
    }

    struct FakeAccountsPort {
        accounts: Vec<Account>,
        transactions: Vec<Transaction>,
    }

    #[async_trait]
    impl AccountsPort for FakeAccountsPort {
        async fn list_accounts(&self, _participant_id: &str, _customer_id: &str) -> PlatformResult<Vec<Account>> {
            Ok(self.accounts.clone())
        }
        async fn get_account(&self, account_id: &str) -> PlatformResult<Option<Account>> {
            Ok(self.accounts.iter().find(|a| a.account_id == account_id).cloned())
        }
        async fn get_balances(&self, account_id: &str) -> PlatformResult<Vec<Balance>> {
            Ok(vec![Balance {
                account_id: account_id.to_string(),
                balance_type: BalanceType::Available,
                amount: 100.0,
                currency: "EUR".to_string(),
                as_of: Utc::now(),
            }])
        }
        async fn get_transactions(
            &self,
            account_id: &str,
            _from: Option<DateTime<Utc>>,
            _to: Option<DateTime<Utc>>,
        ) -> PlatformResult<Vec<Transaction>> {
            Ok(self.transactions.iter().filter(|t| t.account_id == account_id).cloned().collect())
        }
    }

    fn authorized_consent(whitelist: &[&str]) -> Consent {
        let mut consent = Consent::create(
            CreateConsentRequest {
                consent_id: "consent-1".to_string(),
                customer_id: "PSU-1".to_string(),
                participant_id: "tpp-1".to_string(),
                scopes: [SCOPE_ACCOUNTS_READ.to_string()].into_iter().collect(),
                purpose: "account information".to_string(),
                validity_days: 30,
            },
            "corr-1",
        );
        consent
            .authorize(
                AuthorizeContext { account_whitelist: whitelist.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>() },
                "corr-1",
            )
            .unwrap();
        consent
    }

    fn transaction(account_id: &str, id: &str, minutes_ago: i64) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: account_id.to_string(),
            amount: 10.0,
            currency: "EUR".to_string(),
            booking_date_time: Utc::now() - chrono::Duration::minutes(minutes_ago),
            status: "BOOKED".to_string(),
            counterparty: None,
        }
    }

    #[tokio::test]
    async fn list_accounts_filters_through_whitelist() {
        let consent_port = FakeConsentPort { consent: Mutex::new(authorized_consent(&["acct-1"])) };
        let accounts_port = FakeAccountsPort {
            accounts: vec![
                Account { account_id: "acct-1".to_string(), iban: "DE1".to_string(), currency: "EUR".to_string(), account_type: "CURRENT".to_string() },
                Account { account_id: "acct-2".to_string(), iban: "DE2".to_string(), currency: "EUR".to_string(), account_type: "CURRENT".to_string() },
            ],
            transactions: vec![],
        };

        let accounts = list_accounts(&consent_port, &accounts_port, "consent-1", "tpp-1", "PSU-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].account_id, "acct-1");
    }

    #[tokio::test]
    async fn get_account_outside_whitelist_is_forbidden() {
        let consent_port = FakeConsentPort { consent: Mutex::new(authorized_consent(&["acct-1"])) };
        let accounts_port = FakeAccountsPort {
            accounts: vec![Account { account_id: "acct-2".to_string(), iban: "DE2".to_string(), currency: "EUR".to_string(), account_type: "CURRENT".to_string() }],
            transactions: vec![],
        };

        let err = get_account(&consent_port, &accounts_port, "consent-1", "tpp-1", "acct-2", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn transactions_sort_descending_and_paginate() {
        let consent_port = FakeConsentPort { consent: Mutex::new(authorized_consent(&[])) };
        let accounts_port = FakeAccountsPort {
            accounts: vec![],
            transactions: vec![
                transaction("acct-1", "t1", 30),
                transaction("acct-1", "t2", 10),
                transaction("acct-1", "t3", 20),
            ],
        };
        let settings = PlatformSettings::default();

        let page = get_transactions(
            &consent_port,
            &accounts_port,
            "consent-1",
            "tpp-1",
            "acct-1",
            None,
            None,
            1,
            Some(2),
            &settings,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].transaction_id, "t2");
        assert_eq!(page.items[1].transaction_id, "t3");
    }
}
