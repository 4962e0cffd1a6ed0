//! Key Material Store (C13, §4.9). Stores/rotates keys; never returns plaintext.

use crate::error::{PlatformError, PlatformResult};
use crate::security::crypto::hmac_sha256_hex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretVersion {
    pub key: String,
    pub version: u32,
    pub masked: String,
    pub salt: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub key: String,
    pub version: u32,
    pub masked: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub key: String,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait KeyStorePort: Send + Sync {
    async fn latest(&self, key: &str) -> PlatformResult<Option<SecretVersion>>;
    async fn put_version(&self, version: SecretVersion) -> PlatformResult<()>;
    async fn append_audit(&self, entry: AuditEntry) -> PlatformResult<()>;
}

/// Keep the last 4 characters visible, mask the rest. Secrets of length <= 4
/// are masked entirely.
pub fn mask(plaintext: &str) -> String {
    let len = plaintext.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible: String = plaintext.chars().skip(len - 4).collect();
        format!("{}{}", "*".repeat(len - 4), visible)
    }
}

/// `POST internal/secrets`: store a new version of `key`, keyed by a caller-supplied
/// `salt`. Returns metadata only; the plaintext and hash never leave this function.
pub async fn store_secret(
    store: &dyn KeyStorePort,
    actor: &str,
    key: &str,
    plaintext: &str,
    salt: &str,
    now: DateTime<Utc>,
) -> PlatformResult<SecretMetadata> {
    let next_version = match store.latest(key).await? {
        Some(existing) => existing.version + 1,
        None => 1,
    };
    let hash = hmac_sha256_hex(salt.as_bytes(), plaintext.as_bytes());
    let masked = mask(plaintext);

    store
        .put_version(SecretVersion {
            key: key.to_string(),
            version: next_version,
            masked: masked.clone(),
            salt: salt.to_string(),
            hash,
            created_at: now,
        })
        .await?;
    store
        .append_audit(AuditEntry { actor: actor.to_string(), key: key.to_string(), version: next_version, timestamp: now })
        .await?;

    Ok(SecretMetadata { key: key.to_string(), version: next_version, masked, created_at: now })
}

/// `GET internal/secrets/{key}`: metadata only.
pub async fn get_secret_metadata(store: &dyn KeyStorePort, key: &str) -> PlatformResult<SecretMetadata> {
    let version = store
        .latest(key)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("secret '{key}' not found")))?;
    Ok(SecretMetadata { key: version.key, version: version.version, masked: version.masked, created_at: version.created_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryKeyStore {
        versions: Mutex<HashMap<String, SecretVersion>>,
        audit_log: Mutex<Vec<AuditEntry>>,
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

    #[test]
    fn masks_all_but_last_four_characters() {
        assert_eq!(mask("supersecretvalue"), "************alue");
        assert_eq!(mask("abc"), "***");
    }

    #[tokio::test]
    async fn storing_a_secret_never_exposes_plaintext_in_metadata() {
        let store = InMemoryKeyStore::default();
        let metadata = store_secret(&store, "admin", "db-password", "hunter2-super-secret", "salt-1", Utc::now())
            .await
            .unwrap();

        assert_eq!(metadata.version, 1);
        assert!(!metadata.masked.contains("hunter2-super-secret"));
        assert_eq!(store.audit_log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rotating_a_secret_increments_version() {
        let store = InMemoryKeyStore::default();
        store_secret(&store, "admin", "api-key", "first-value", "salt-1", Utc::now()).await.unwrap();
        let second = store_secret(&store, "admin", "api-key", "second-value", "salt-2", Utc::now()).await.unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(store.audit_log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_metadata_for_unknown_key_is_not_found() {
        let store = InMemoryKeyStore::default();
        let err = get_secret_metadata(&store, "missing").await.unwrap_err();
        assert_eq!(err.error_code(), "RESOURCE_NOT_FOUND");
    }
}
