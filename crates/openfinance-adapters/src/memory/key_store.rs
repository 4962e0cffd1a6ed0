use async_trait::async_trait;
use openfinance_core::error::PlatformResult;
use openfinance_core::key_store::{AuditEntry, KeyStorePort, SecretVersion};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process key material store (C13). Only masked values, salts, and HMAC
/// hashes are retained; plaintext is never stored.
#[derive(Default)]
pub struct InMemoryKeyStore {
    versions: Mutex<HashMap<String, SecretVersion>>,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyStorePort for InMemoryKeyStore {
    async fn latest(&self, key: &str) -> PlatformResult<Option<SecretVersion>> {
        Ok(self.versions.lock().unwrap().get(key).cloned())
    }

    async fn put_version(&self, version: SecretVersion) -> PlatformResult<()> {
        self.versions.lock().unwrap().insert(version.key.clone(), version);
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> PlatformResult<()> {
        self.audit_log.lock().unwrap().push(entry);
        Ok(())
    }
}
