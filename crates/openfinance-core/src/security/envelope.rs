use crate::error::{PlatformError, PlatformResult};
use crate::ports::{CachePort, JwksPort, SigningKeyMaterial};
use crate::security::dpop::{self, verify_dpop_proof};
use crate::settings::PlatformSettings;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Identity yielded by a successfully validated request (§4.1).
#[derive(Debug, Clone)]
pub struct Principal {
    pub participant_id: String,
    pub psu_id: Option<String>,
    pub scopes: BTreeSet<String>,
    pub token_jti: String,
    pub interaction_id: String,
}

/// Everything the envelope needs from an inbound HTTP request, independent of
/// the web framework that extracted it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Canonicalized target URL, matched against the DPoP proof's `htu`.
    pub url: String,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    /// SHA-256 thumbprint of the mTLS client certificate, supplied by the TLS terminator.
    pub mtls_thumbprint: Option<String>,
    pub required_scope: String,
    pub is_authorization_endpoint: bool,
    pub request_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AccessTokenClaims {
    iss: String,
    sub: String,
    #[allow(dead_code)]
    exp: i64,
    #[allow(dead_code)]
    nbf: Option<i64>,
    #[allow(dead_code)]
    iat: i64,
    scope: String,
    jti: Option<String>,
    psu_id: Option<String>,
    cnf: Option<Cnf>,
}

#[derive(Debug, Clone, Deserialize)]
struct Cnf {
    #[serde(rename = "x5t#S256")]
    x5t_s256: Option<String>,
    jkt: Option<String>,
}

/// FAPI 2.0 request validation filter (C8). Ordering is fixed and short-circuits
/// on first failure, per §4.1.
pub struct FapiSecurityEnvelope {
    settings: PlatformSettings,
    /// Resource-server audience expected in `aud`. Open Question 2: a single static
    /// audience is used; per-endpoint audience mapping is not implemented (see DESIGN.md).
    expected_audience: String,
}

impl FapiSecurityEnvelope {
    pub fn new(settings: PlatformSettings, expected_audience: impl Into<String>) -> Self {
        Self { settings, expected_audience: expected_audience.into() }
    }

    pub async fn validate(
        &self,
        request: &InboundRequest,
        jwks: &dyn JwksPort,
        cache: &dyn CachePort,
        now: DateTime<Utc>,
    ) -> PlatformResult<Principal> {
        // 1. Transport: mTLS peer certificate present.
        let thumbprint = request
            .mtls_thumbprint
            .clone()
            .ok_or_else(|| PlatformError::security("INVALID_REQUEST", "missing mTLS client certificate"))?;

        // 2. Required FAPI headers.
        let interaction_id = require_header(request, "x-fapi-interaction-id")?;
        Uuid::parse_str(&interaction_id)
            .map_err(|_| PlatformError::security("INVALID_REQUEST", "x-fapi-interaction-id must be a UUID"))?;

        let auth_date = require_header(request, "x-fapi-auth-date")?;
        let auth_date = DateTime::parse_from_rfc3339(&auth_date)
            .map_err(|_| PlatformError::security("INVALID_REQUEST", "x-fapi-auth-date must be ISO-8601"))?
            .with_timezone(&Utc);
        if (now - auth_date).num_seconds().abs() > self.settings.security_header_skew_seconds {
            return Err(PlatformError::security("INVALID_REQUEST", "x-fapi-auth-date outside allowed skew"));
        }

        let customer_ip = require_header(request, "x-fapi-customer-ip-address")?;
        if customer_ip.parse::<std::net::IpAddr>().is_err() {
            return Err(PlatformError::security("INVALID_REQUEST", "x-fapi-customer-ip-address is not a valid IP"));
        }

        let authorization = require_header(request, "authorization")?;
        let access_token = authorization
            .strip_prefix("Bearer ")
            .ok_or_else(|| PlatformError::security("INVALID_TOKEN", "Authorization header must be a Bearer token"))?
            .to_string();
        let dpop_proof = require_header(request, "dpop")?;

        // 3. Access token.
        let claims = self.verify_access_token(&access_token, jwks).await?;
        if claims.cnf.as_ref().and_then(|c| c.x5t_s256.as_deref()) != Some(thumbprint.as_str()) {
            return Err(PlatformError::security("INVALID_TOKEN", "mTLS thumbprint does not match token cnf.x5t#S256"));
        }

        // 4. DPoP proof.
        let verified_dpop = verify_dpop_proof(
            &dpop_proof,
            &request.method,
            &request.url,
            &access_token,
            now,
            self.settings.security_header_skew_seconds,
        )?;
        if claims.cnf.as_ref().and_then(|c| c.jkt.as_deref()) != Some(verified_dpop.jwk_thumbprint.as_str()) {
            return Err(PlatformError::security("INVALID_DPOP_PROOF", "DPoP key thumbprint does not match token cnf.jkt"));
        }
        dpop::enforce_replay_defense(
            cache,
            &claims.iss,
            &verified_dpop.claims.jti,
            self.settings.security_dpop_replay_window_seconds,
        )
        .await?;

        // 5. PAR (authorization endpoints only).
        if request.is_authorization_endpoint {
            let request_uri = request
                .request_uri
                .as_deref()
                .ok_or_else(|| PlatformError::security("INVALID_REQUEST", "authorization endpoint requires request_uri"))?;
            consume_par(cache, request_uri, self.settings.security_par_ttl_seconds).await?;
        }

        // 6. Scope extraction.
        let scopes = parse_scopes(&claims.scope);
        if !scopes.contains(request.required_scope.as_str()) {
            return Err(PlatformError::authorization(
                "INSUFFICIENT_SCOPE",
                format!("token missing required scope '{}'", request.required_scope),
            ));
        }

        Ok(Principal {
            participant_id: claims.sub,
            psu_id: claims.psu_id,
            scopes,
            token_jti: claims.jti.unwrap_or_default(),
            interaction_id,
        })
    }

    async fn verify_access_token(&self, token: &str, jwks: &dyn JwksPort) -> PlatformResult<AccessTokenClaims> {
        let header = decode_header(token)
            .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("malformed access token header: {e}")))?;
        let kid = header
            .kid
            .clone()
            .ok_or_else(|| PlatformError::security("INVALID_TOKEN", "access token missing kid"))?;
        let issuer = peek_unverified_issuer(token)?;

        let key_material = jwks
            .signing_key(&issuer, &kid)
            .await
            .map_err(|_| PlatformError::security("INVALID_TOKEN", "unable to resolve signing key for access token"))?;
        let decoding_key = decoding_key_from_material(&key_material)?;

        let mut validation = Validation::new(algorithm_from_name(&key_material.algorithm)?);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.validate_nbf = true;

        let token_data = decode::<AccessTokenClaims>(token, &decoding_key, &validation)
            .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("access token verification failed: {e}")))?;
        Ok(token_data.claims)
    }
}

/// Single-use consumption of a pushed-authorization-request `request_uri`. PAR issuance
/// is an authorization-server concern outside this crate; only consumption is enforced here.
async fn consume_par(cache: &dyn CachePort, request_uri: &str, par_ttl_seconds: i64) -> PlatformResult<()> {
    let key = format!("par-consumed:{request_uri}");
    let first_use = cache
        .set_if_absent(&key, "consumed".to_string(), chrono::Duration::seconds(par_ttl_seconds))
        .await?;
    if first_use {
        Ok(())
    } else {
        Err(PlatformError::security("INVALID_REQUEST", "request_uri already consumed or unknown"))
    }
}

fn require_header(request: &InboundRequest, name: &str) -> PlatformResult<String> {
    request
        .headers
        .get(name)
        .cloned()
        .ok_or_else(|| PlatformError::security("INVALID_REQUEST", format!("missing required header '{name}'")))
}

fn parse_scopes(scope_claim: &str) -> BTreeSet<String> {
    scope_claim.split_whitespace().map(str::to_string).collect()
}

fn peek_unverified_issuer(token: &str) -> PlatformResult<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload_segment = token
        .split('.')
        .nth(1)
        .ok_or_else(|| PlatformError::security("INVALID_TOKEN", "malformed access token"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload_segment)
        .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("bad token payload encoding: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("bad token payload json: {e}")))?;
    value
        .get("iss")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| PlatformError::security("INVALID_TOKEN", "access token missing iss"))
}

fn decoding_key_from_material(material: &SigningKeyMaterial) -> PlatformResult<DecodingKey> {
    let pem = material.public_key_pem.as_bytes();
    if material.algorithm.starts_with("RS") || material.algorithm.starts_with("PS") {
        DecodingKey::from_rsa_pem(pem)
            .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("bad RSA signing key: {e}")))
    } else if material.algorithm.starts_with("ES") {
        DecodingKey::from_ec_pem(pem)
            .map_err(|e| PlatformError::security("INVALID_TOKEN", format!("bad EC signing key: {e}")))
    } else {
        Err(PlatformError::security(
            "INVALID_TOKEN",
            format!("unsupported signing algorithm '{}'", material.algorithm),
        ))
    }
}

fn algorithm_from_name(name: &str) -> PlatformResult<Algorithm> {
    match name {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "PS256" => Ok(Algorithm::PS256),
        other => Err(PlatformError::security("INVALID_TOKEN", format!("unsupported algorithm '{other}'"))),
    }
}
