//! Bearer token verification against an Auth0 tenant.
//!
//! When no tenant is configured the verifier is `Disabled` and every request
//! is treated as anonymous; `serve` logs a warning in that case.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::state::AppState;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid authentication credentials")]
    InvalidScheme,

    #[error("Failed to decode token header: {0}")]
    DecodeHeader(jsonwebtoken::errors::Error),

    #[error("Token header has no key id")]
    MissingKid,

    #[error("Signing key {0} not found in JWKS")]
    UnknownKid(String),

    #[error("Token algorithm {0:?} is not accepted")]
    AlgorithmNotAllowed(Algorithm),

    #[error("Invalid token: {0}")]
    InvalidToken(jsonwebtoken::errors::Error),

    #[error("Unsupported algorithm in configuration: {0}")]
    BadAlgorithmConfig(String),

    #[error("Failed to fetch JWKS from {url}: {source}")]
    Jwks {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl AuthError {
    /// HTTPBearer semantics: a missing or malformed header is 403, a token
    /// that fails verification is 401.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::NotAuthenticated | AuthError::InvalidScheme)
    }
}

/// Verified token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims(pub Value);

impl Claims {
    pub fn anonymous() -> Self {
        Claims(Value::Object(Default::default()))
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Best human-readable name in the token, used for record notes.
    pub fn display_name(&self) -> Option<&str> {
        ["name", "nickname", "email"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum Auth0Verifier {
    Disabled,
    Enabled {
        jwk_set: JwkSet,
        audience: String,
        issuer: Option<String>,
        algorithms: Vec<Algorithm>,
    },
}

impl Auth0Verifier {
    /// Enabled exactly when [`AuthConfig::is_enabled`] says so; an explicit
    /// `jwks_url` alone does not switch verification on.
    pub async fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if !config.is_enabled() {
            return Ok(Self::Disabled);
        }
        let (Some(audience), Some(jwks_url)) = (config.audience.clone(), config.effective_jwks_url())
        else {
            return Ok(Self::Disabled);
        };

        let jwk_set: JwkSet = async {
            reqwest::get(&jwks_url)
                .await?
                .error_for_status()?
                .json::<JwkSet>()
                .await
        }
        .await
        .map_err(|source| AuthError::Jwks {
            url: jwks_url.clone(),
            source,
        })?;

        info!(keys = jwk_set.keys.len(), %jwks_url, "Loaded JWKS");
        Self::with_jwk_set(jwk_set, audience, config.effective_issuer(), &config.algorithms)
    }

    pub fn with_jwk_set(
        jwk_set: JwkSet,
        audience: String,
        issuer: Option<String>,
        algorithms: &[String],
    ) -> Result<Self, AuthError> {
        let algorithms = algorithms
            .iter()
            .map(|alg| {
                Algorithm::from_str(alg.trim())
                    .map_err(|_| AuthError::BadAlgorithmConfig(alg.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::Enabled {
            jwk_set,
            audience,
            issuer,
            algorithms,
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let Self::Enabled {
            jwk_set,
            audience,
            issuer,
            algorithms,
        } = self
        else {
            return Ok(Claims::anonymous());
        };

        let token = bearer_token(headers)?;
        let header = decode_header(token).map_err(AuthError::DecodeHeader)?;
        if !algorithms.contains(&header.alg) {
            return Err(AuthError::AlgorithmNotAllowed(header.alg));
        }

        let kid = header.kid.ok_or(AuthError::MissingKid)?;
        let jwk = jwk_set
            .find(&kid)
            .ok_or_else(|| AuthError::UnknownKid(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk).map_err(AuthError::InvalidToken)?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[audience]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<Value>(token, &key, &validation).map_err(AuthError::InvalidToken)?;
        Ok(Claims(data.claims))
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::NotAuthenticated)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::NotAuthenticated)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidScheme);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::NotAuthenticated);
    }
    Ok(token)
}

/// Extractor guarding authenticated routes.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = crate::error::AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth
            .verify(&parts.headers)
            .map(Authenticated)
            .map_err(|err| {
                warn!(error = %err, path = %parts.uri.path(), "Rejected request");
                err.into()
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub(crate) const TEST_SECRET: &[u8] = b"receipt-test-signing-secret-01234567";
    pub(crate) const TEST_AUDIENCE: &str = "https://receipts.example";
    pub(crate) const TEST_ISSUER: &str = "https://tenant.example/";

    pub(crate) fn test_verifier() -> Auth0Verifier {
        let jwk_set: JwkSet = serde_json::from_value(json!({
            "keys": [{
                "kty": "oct",
                "kid": "test-key",
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(TEST_SECRET),
            }]
        }))
        .unwrap();

        Auth0Verifier::with_jwk_set(
            jwk_set,
            TEST_AUDIENCE.to_string(),
            Some(TEST_ISSUER.to_string()),
            &["HS256".to_string()],
        )
        .unwrap()
    }

    pub(crate) fn signed_token(audience: &str, exp_offset_secs: i64) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-key".to_string());
        let claims = json!({
            "sub": "auth0|driver",
            "name": "Dana Driver",
            "aud": audience,
            "iss": TEST_ISSUER,
            "exp": chrono::Utc::now().timestamp() + exp_offset_secs,
        });
        encode(&header, &claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn disabled_verifier_accepts_anonymous() {
        let claims = Auth0Verifier::Disabled.verify(&HeaderMap::new()).unwrap();
        assert_eq!(claims, Claims::anonymous());
        assert!(claims.display_name().is_none());
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = signed_token(TEST_AUDIENCE, 600);
        let claims = test_verifier()
            .verify(&headers_with(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(claims.subject(), Some("auth0|driver"));
        assert_eq!(claims.display_name(), Some("Dana Driver"));
    }

    #[test]
    fn missing_header_is_forbidden() {
        let err = test_verifier().verify(&HeaderMap::new()).unwrap_err();
        assert!(err.is_forbidden());

        let err = test_verifier().verify(&headers_with("Basic abc")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidScheme));
    }

    #[test]
    fn wrong_audience_and_expired_tokens_are_rejected() {
        let token = signed_token("https://someone-else", 600);
        let err = test_verifier()
            .verify(&headers_with(&format!("Bearer {token}")))
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert!(!err.is_forbidden());

        let token = signed_token(TEST_AUDIENCE, -3600);
        let err = test_verifier()
            .verify(&headers_with(&format!("Bearer {token}")))
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn verification_follows_config_enabled_rule() {
        // An explicit JWKS location without a tenant domain leaves auth off.
        let without_domain = AuthConfig {
            audience: Some(TEST_AUDIENCE.to_string()),
            jwks_url: Some("http://127.0.0.1:9/jwks.json".to_string()),
            ..AuthConfig::default()
        };
        assert!(!without_domain.is_enabled());
        let verifier = Auth0Verifier::from_config(&without_domain).await.unwrap();
        assert!(!verifier.is_enabled());

        // With the domain it is on, so the unreachable JWKS is fatal.
        let with_domain = AuthConfig {
            domain: Some("tenant.example".to_string()),
            ..without_domain
        };
        assert!(with_domain.is_enabled());
        let err = Auth0Verifier::from_config(&with_domain).await.unwrap_err();
        assert!(matches!(err, AuthError::Jwks { ref url, .. } if url == "http://127.0.0.1:9/jwks.json"));
    }

    #[test]
    fn rejects_unconfigured_algorithm_names() {
        let err = Auth0Verifier::with_jwk_set(
            JwkSet { keys: vec![] },
            TEST_AUDIENCE.to_string(),
            None,
            &["ROT13".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::BadAlgorithmConfig(_)));
    }
}
