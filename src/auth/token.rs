//! Token-based tenant authentication.
//!
//! Decodes and verifies JWT compact serializations
//! (`base64url(header).base64url(payload).base64url(signature)`) whose payload
//! carries a `tenant_id` claim, and mints HS256 tokens for tooling and tests.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Minimum secret length for security.
const MIN_SECRET_LENGTH: usize = 32;

/// Number of dot-separated segments in a compact JWT.
const TOKEN_SEGMENTS: usize = 3;

/// Token validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token: expected 3 segments, got {segments}")]
    Malformed { segments: usize },
    #[error("Invalid base64url encoding in {0} segment")]
    InvalidEncoding(&'static str),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Token signature invalid")]
    InvalidSignature,
    #[error("Missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("Token expired at {expired_at}")]
    Expired { expired_at: u64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Recognized JWT claims.
///
/// Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenClaims {
    /// Tenant the token grants access to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Subject (user or service ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    /// Create claims for a tenant, issued now and without expiry.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            iat: Some(unix_now() as i64),
            ..Default::default()
        }
    }

    /// Set subject.
    pub fn with_subject(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Set issuer.
    pub fn with_issuer(mut self, iss: impl Into<String>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Expire `validity` from now, saturating at `i64::MAX`.
    pub fn expires_in(mut self, validity: Duration) -> Self {
        let exp = unix_now().saturating_add(validity.as_secs());
        self.exp = Some(i64::try_from(exp).unwrap_or(i64::MAX));
        self
    }

    /// Set an absolute expiry (Unix seconds).
    pub fn expires_at(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Seconds until expiry, `None` when the token never expires.
    pub fn remaining_validity(&self) -> Option<Duration> {
        self.exp
            .map(|exp| Duration::from_secs((exp.max(0) as u64).saturating_sub(unix_now())))
    }
}

/// The three borrowed segments of a compact token.
#[derive(Debug, Clone, Copy)]
pub struct TokenParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl<'a> TokenParts<'a> {
    /// Split a raw token into exactly three dot-separated segments.
    pub fn split(raw: &'a str) -> Result<Self, TokenError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != TOKEN_SEGMENTS {
            return Err(TokenError::Malformed {
                segments: parts.len(),
            });
        }
        Ok(Self {
            header: parts[0],
            payload: parts[1],
            signature: parts[2],
        })
    }

    /// Decode the payload into claims without verifying anything.
    pub fn claims(&self) -> Result<TokenClaims, TokenError> {
        let bytes = decode_segment(self.payload).ok_or(TokenError::InvalidEncoding("payload"))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::InvalidPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(TokenError::InvalidPayload(
                "payload is not a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| TokenError::InvalidPayload(e.to_string()))
    }

    fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }
}

/// Token verifier.
///
/// Without a secret, signatures are not checked.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Option<String>,
    enforce_algorithm: bool,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("enforce_algorithm", &self.enforce_algorithm)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier. An empty secret is treated as "no secret".
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        match &secret {
            Some(s) if s.len() < MIN_SECRET_LENGTH => tracing::warn!(
                "Token secret is shorter than {} bytes. Consider using a longer secret for production.",
                MIN_SECRET_LENGTH
            ),
            None => tracing::warn!("No token secret configured, JWT signatures will not be verified"),
            _ => {}
        }
        Self {
            secret,
            enforce_algorithm: false,
        }
    }

    /// Reject tokens whose header does not declare HS256.
    pub fn with_algorithm_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_algorithm = enforce;
        self
    }

    /// Whether signatures are verified.
    pub fn verifies_signatures(&self) -> bool {
        self.secret.is_some()
    }

    /// Decode and validate a split token, returning its claims.
    ///
    /// Checks run in order: payload decoding, expiry, algorithm (when
    /// enforced), signature (when a secret is set), `tenant_id` presence.
    pub fn verify(&self, parts: &TokenParts<'_>) -> Result<TokenClaims, TokenError> {
        let claims = parts.claims()?;

        if let Some(exp) = claims.exp {
            if exp < unix_now() as i64 {
                return Err(TokenError::Expired {
                    expired_at: exp.max(0) as u64,
                });
            }
        }

        if self.enforce_algorithm {
            let header = decode_segment(parts.header).ok_or(TokenError::InvalidEncoding("header"))?;
            let header: serde_json::Value = serde_json::from_slice(&header)
                .map_err(|e| TokenError::InvalidPayload(e.to_string()))?;
            let alg = header.get("alg").and_then(|v| v.as_str()).unwrap_or("none");
            if alg != "HS256" {
                return Err(TokenError::UnsupportedAlgorithm(alg.to_string()));
            }
        }

        if let Some(secret) = &self.secret {
            let signature =
                decode_segment(parts.signature).ok_or(TokenError::InvalidSignature)?;
            let mut mac = new_mac(secret)?;
            mac.update(parts.signing_input().as_bytes());
            // verify_slice compares in constant time
            mac.verify_slice(&signature)
                .map_err(|_| TokenError::InvalidSignature)?;
        }

        match claims.tenant_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(claims),
            _ => Err(TokenError::MissingClaim("tenant_id")),
        }
    }

    /// Split, decode and validate a raw token string.
    pub fn verify_str(&self, raw: &str) -> Result<TokenClaims, TokenError> {
        self.verify(&TokenParts::split(raw)?)
    }
}

/// Mint an HS256 compact token for the given claims.
pub fn issue_token(claims: &TokenClaims, secret: &str) -> Result<String, TokenError> {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims_json = serde_json::to_string(claims)
        .map_err(|e| TokenError::InvalidConfiguration(format!("Failed to serialize claims: {}", e)))?;
    let payload = URL_SAFE_NO_PAD.encode(claims_json);

    let signing_input = format!("{}.{}", header, payload);
    let mut mac = new_mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

fn new_mac(secret: &str) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TokenError::InvalidConfiguration(e.to_string()))
}

/// Decode a base64url segment, tolerating missing padding.
///
/// The segment is mapped onto the standard alphabet (`-` to `+`, `_` to `/`)
/// and padded with `=` to a multiple of four before decoding.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let mut normalized: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    STANDARD.decode(normalized).ok()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-only-for-unit-tests-not-production";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Some(SECRET.to_string()))
    }

    #[test]
    fn test_issue_and_verify() {
        let claims = TokenClaims::new("acme")
            .with_subject("user-1")
            .with_issuer("strata")
            .expires_in(Duration::from_secs(3600));
        let token = issue_token(&claims, SECRET).unwrap();

        let parsed = verifier().verify_str(&token).unwrap();
        assert_eq!(parsed.tenant_id.as_deref(), Some("acme"));
        assert_eq!(parsed.sub.as_deref(), Some("user-1"));
        assert_eq!(parsed.iss.as_deref(), Some("strata"));
    }

    #[test]
    fn test_malformed_segment_count() {
        assert_eq!(
            verifier().verify_str("only.two").unwrap_err(),
            TokenError::Malformed { segments: 2 }
        );
        assert_eq!(
            verifier().verify_str("a.b.c.d").unwrap_err(),
            TokenError::Malformed { segments: 4 }
        );
    }

    #[test]
    fn test_tampered_signature() {
        let token = issue_token(&TokenClaims::new("acme"), SECRET).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_sig = URL_SAFE_NO_PAD.encode([7u8; 32]);
        let tampered = format!("{}.{}.{}", parts[0], parts[1], forged_sig);

        assert_eq!(
            verifier().verify_str(&tampered).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_token(&TokenClaims::new("acme"), "another-secret").unwrap();
        assert_eq!(
            verifier().verify_str(&token).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn test_expired_token() {
        let claims = TokenClaims::new("acme").expires_at(1_000);
        let token = issue_token(&claims, SECRET).unwrap();
        assert_eq!(
            verifier().verify_str(&token).unwrap_err(),
            TokenError::Expired { expired_at: 1_000 }
        );
    }

    #[test]
    fn test_missing_tenant_claim() {
        let claims = TokenClaims {
            sub: Some("user-1".into()),
            ..Default::default()
        };
        let token = issue_token(&claims, SECRET).unwrap();
        assert_eq!(
            verifier().verify_str(&token).unwrap_err(),
            TokenError::MissingClaim("tenant_id")
        );
    }

    #[test]
    fn test_unverified_mode_skips_signature() {
        let token = issue_token(&TokenClaims::new("acme"), "whatever").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let unsigned = format!("{}.{}.", parts[0], parts[1]);

        let open = TokenVerifier::new(None);
        assert!(!open.verifies_signatures());
        assert_eq!(
            open.verify_str(&unsigned).unwrap().tenant_id.as_deref(),
            Some("acme")
        );
    }

    #[test]
    fn test_bad_payload_encoding() {
        let result = verifier().verify_str("eyJhbGciOiJIUzI1NiJ9.!!!.sig");
        assert_eq!(result.unwrap_err(), TokenError::InvalidEncoding("payload"));
    }

    #[test]
    fn test_non_object_payload() {
        let payload = URL_SAFE_NO_PAD.encode(r#"["acme"]"#);
        let raw = format!("h.{}.s", payload);
        assert!(matches!(
            verifier().verify_str(&raw).unwrap_err(),
            TokenError::InvalidPayload(_)
        ));
    }

    #[test]
    fn test_padded_and_unpadded_segments_decode() {
        // "{}" has length 2, so its base64 form needs padding
        assert_eq!(decode_segment("e30").unwrap(), b"{}");
        assert_eq!(decode_segment("e30=").unwrap(), b"{}");
        // url-safe characters map onto the standard alphabet
        assert_eq!(decode_segment("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_algorithm_enforcement() {
        let token = issue_token(&TokenClaims::new("acme"), SECRET).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let none_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let swapped = format!("{}.{}.{}", none_header, parts[1], parts[2]);

        let strict = verifier().with_algorithm_enforcement(true);
        assert_eq!(
            strict.verify_str(&swapped).unwrap_err(),
            TokenError::UnsupportedAlgorithm("none".to_string())
        );
        assert!(strict.verify_str(&token).is_ok());
    }

    #[test]
    fn test_remaining_validity() {
        let claims = TokenClaims::new("acme").expires_in(Duration::from_secs(120));
        let remaining = claims.remaining_validity().unwrap();
        assert!(remaining <= Duration::from_secs(120));
        assert!(remaining >= Duration::from_secs(118));
        assert!(TokenClaims::new("acme").remaining_validity().is_none());
    }

    #[test]
    fn test_huge_validity_saturates() {
        let claims = TokenClaims::new("acme").expires_in(Duration::MAX);
        assert_eq!(claims.exp, Some(i64::MAX));
        assert!(claims.remaining_validity().unwrap() > Duration::from_secs(86_400));

        let token = issue_token(&claims, SECRET).unwrap();
        assert!(verifier().verify_str(&token).is_ok());
    }

    #[test]
    fn test_verifier_debug_redacts_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("<redacted>"));
    }
}
