use crate::error::{PlatformError, PlatformResult};
use crate::ports::CachePort;
use crate::security::crypto::sha256_base64url;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

/// DPoP proof claims (RFC 9449). The confirming key is carried in the JWT header's
/// embedded `jwk`, not in the claims.
#[derive(Debug, Clone, Deserialize)]
pub struct DpopClaims {
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub jti: String,
    pub ath: Option<String>,
}

pub struct VerifiedDpop {
    pub claims: DpopClaims,
    pub jwk_thumbprint: String,
}

/// Verify a DPoP proof per §4.1 step 4: signature over the embedded `jwk`, `htm`/`htu`
/// matching the request, `iat` within skew, and `ath` equal to the access token's hash.
pub fn verify_dpop_proof(
    proof_jwt: &str,
    expected_method: &str,
    expected_url: &str,
    access_token: &str,
    now: DateTime<Utc>,
    skew_seconds: i64,
) -> PlatformResult<VerifiedDpop> {
    let header = decode_header(proof_jwt)
        .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("malformed DPoP header: {e}")))?;
    if header.typ.as_deref() != Some("dpop+jwt") {
        return Err(PlatformError::security("INVALID_DPOP_PROOF", "DPoP proof missing typ=dpop+jwt"));
    }

    let jwk = header_jwk(proof_jwt)?;
    let (decoding_key, jwk_thumbprint) = decoding_key_from_jwk(&jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<DpopClaims>(proof_jwt, &decoding_key, &validation)
        .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("DPoP signature invalid: {e}")))?;
    let claims = token_data.claims;

    if !claims.htm.eq_ignore_ascii_case(expected_method) {
        return Err(PlatformError::security("INVALID_DPOP_PROOF", "htm does not match request method"));
    }
    if claims.htu != expected_url {
        return Err(PlatformError::security("INVALID_DPOP_PROOF", "htu does not match request URL"));
    }
    if (now.timestamp() - claims.iat).abs() > skew_seconds {
        return Err(PlatformError::security("INVALID_DPOP_PROOF", "iat outside allowed skew"));
    }
    let expected_ath = sha256_base64url(access_token.as_bytes());
    if claims.ath.as_deref() != Some(expected_ath.as_str()) {
        return Err(PlatformError::security("INVALID_DPOP_PROOF", "ath does not match access token"));
    }

    Ok(VerifiedDpop { claims, jwk_thumbprint })
}

/// Reject a DPoP proof whose `jti` was already observed for this issuer within the
/// replay window; relies on the cache's atomic set-if-absent (C9/C4).
pub async fn enforce_replay_defense(
    cache: &dyn CachePort,
    issuer_scope: &str,
    jti: &str,
    window_seconds: i64,
) -> PlatformResult<()> {
    let key = format!("dpop-replay:{issuer_scope}:{jti}");
    let first_use = cache
        .set_if_absent(&key, "seen".to_string(), chrono::Duration::seconds(window_seconds))
        .await?;
    if first_use {
        Ok(())
    } else {
        Err(PlatformError::security("INVALID_DPOP_PROOF", "DPoP proof jti replayed within window"))
    }
}

fn header_jwk(proof_jwt: &str) -> PlatformResult<Value> {
    let header_segment = proof_jwt
        .split('.')
        .next()
        .ok_or_else(|| PlatformError::security("INVALID_DPOP_PROOF", "missing header segment"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(header_segment)
        .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("bad base64 header: {e}")))?;
    let header_json: Value = serde_json::from_slice(&bytes)
        .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("bad header json: {e}")))?;
    header_json
        .get("jwk")
        .cloned()
        .ok_or_else(|| PlatformError::security("INVALID_DPOP_PROOF", "DPoP header missing embedded jwk"))
}

fn decoding_key_from_jwk(jwk: &Value) -> PlatformResult<(DecodingKey, String)> {
    let kty = jwk.get("kty").and_then(|v| v.as_str()).unwrap_or_default();
    let thumbprint = jwk_thumbprint(jwk, kty)?;
    let key = match kty {
        "EC" => {
            let x = jwk_str(jwk, "x")?;
            let y = jwk_str(jwk, "y")?;
            DecodingKey::from_ec_components(&x, &y)
                .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("bad EC jwk: {e}")))?
        }
        "RSA" => {
            let n = jwk_str(jwk, "n")?;
            let e = jwk_str(jwk, "e")?;
            DecodingKey::from_rsa_components(&n, &e)
                .map_err(|e| PlatformError::security("INVALID_DPOP_PROOF", format!("bad RSA jwk: {e}")))?
        }
        other => {
            return Err(PlatformError::security(
                "INVALID_DPOP_PROOF",
                format!("unsupported jwk kty '{other}'"),
            ))
        }
    };
    Ok((key, thumbprint))
}

/// RFC 7638 JWK thumbprint: SHA-256 over the lexicographically-ordered required members.
fn jwk_thumbprint(jwk: &Value, kty: &str) -> PlatformResult<String> {
    let canonical = match kty {
        "EC" => format!(
            "{{\"crv\":\"{}\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
            jwk_str(jwk, "crv")?,
            jwk_str(jwk, "x")?,
            jwk_str(jwk, "y")?
        ),
        "RSA" => format!(
            "{{\"e\":\"{}\",\"kty\":\"RSA\",\"n\":\"{}\"}}",
            jwk_str(jwk, "e")?,
            jwk_str(jwk, "n")?
        ),
        other => {
            return Err(PlatformError::security(
                "INVALID_DPOP_PROOF",
                format!("unsupported jwk kty '{other}'"),
            ))
        }
    };
    Ok(sha256_base64url(canonical.as_bytes()))
}

fn jwk_str(jwk: &Value, field: &str) -> PlatformResult<String> {
    jwk.get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| PlatformError::security("INVALID_DPOP_PROOF", format!("jwk missing '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_thumbprint_is_order_independent_of_input_json() {
        let a = serde_json::json!({"kty": "RSA", "n": "abc", "e": "AQAB"});
        let b = serde_json::json!({"e": "AQAB", "n": "abc", "kty": "RSA"});
        assert_eq!(jwk_thumbprint(&a, "RSA").unwrap(), jwk_thumbprint(&b, "RSA").unwrap());
    }

    #[test]
    fn missing_jwk_member_is_rejected() {
        let incomplete = serde_json::json!({"kty": "RSA", "n": "abc"});
        assert!(jwk_thumbprint(&incomplete, "RSA").is_err());
    }
}
