use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// `requestHash = SHA-256(canonical-payload ++ interactionId)` (§4.5 use-case skeleton step 3).
pub fn request_hash(canonical_payload: &[u8], interaction_id: &str) -> String {
    let mut buf = Vec::with_capacity(canonical_payload.len() + interaction_id.len());
    buf.extend_from_slice(canonical_payload);
    buf.extend_from_slice(interaction_id.as_bytes());
    sha256_hex(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_hash_is_deterministic_and_order_sensitive() {
        let a = request_hash(b"{\"amount\":1}", "interaction-1");
        let b = request_hash(b"{\"amount\":1}", "interaction-1");
        let c = request_hash(b"{\"amount\":1}", "interaction-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hmac_changes_with_secret() {
        let a = hmac_sha256_hex(b"secret-a", b"plaintext");
        let b = hmac_sha256_hex(b"secret-b", b"plaintext");
        assert_ne!(a, b);
    }
}
