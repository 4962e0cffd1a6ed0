use async_trait::async_trait;
use openfinance_core::error::{PlatformError, PlatformResult};
use openfinance_core::ports::{JwksPort, SigningKeyMaterial};
use std::collections::HashMap;
use std::sync::Mutex;

fn key(issuer: &str, kid: &str) -> String {
    format!("{issuer}#{kid}")
}

/// Fixture JWKS resolver (C8 step 3). A production adapter fetches and caches
/// the authorization server's JWKS document (`security.jwks_cache_ttl_seconds`);
/// here keys are seeded directly, with the caching policy left to the caller.
#[derive(Default)]
pub struct InMemoryJwks {
    keys: Mutex<HashMap<String, SigningKeyMaterial>>,
}

impl InMemoryJwks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, issuer: &str, kid: &str, material: SigningKeyMaterial) {
        self.keys.lock().unwrap().insert(key(issuer, kid), material);
    }
}

#[async_trait]
impl JwksPort for InMemoryJwks {
    async fn signing_key(&self, issuer: &str, kid: &str) -> PlatformResult<SigningKeyMaterial> {
        self.keys
            .lock()
            .unwrap()
            .get(&key(issuer, kid))
            .cloned()
            .ok_or_else(|| PlatformError::security("invalid_token", format!("unknown kid '{kid}' for issuer '{issuer}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_kid_is_a_security_error() {
        let jwks = InMemoryJwks::new();
        let err = jwks.signing_key("https://as.example", "kid-1").await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[tokio::test]
    async fn seeded_kid_resolves() {
        let jwks = InMemoryJwks::new();
        jwks.seed(
            "https://as.example",
            "kid-1",
            SigningKeyMaterial { algorithm: "RS256".to_string(), public_key_pem: "----".to_string() },
        );
        let material = jwks.signing_key("https://as.example", "kid-1").await.unwrap();
        assert_eq!(material.algorithm, "RS256");
    }
}
