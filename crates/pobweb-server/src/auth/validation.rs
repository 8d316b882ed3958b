use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::config::AuthConfig;
use super::jwks::JwksProvider;
use super::{AuthError, AuthResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: Option<String>,
    /// String or array.
    pub aud: Option<serde_json::Value>,
    pub exp: u64,
    pub nbf: Option<u64>,
    pub iat: Option<u64>,
}

enum KeySource {
    Jwks(JwksProvider),
    Static(Arc<DecodingKey>),
}

pub struct TokenValidator {
    keys: KeySource,
    config: AuthConfig,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::Malformed {
        reason: reason.into(),
    }
}

fn rejected(reason: impl Into<String>) -> AuthError {
    AuthError::Rejected {
        reason: reason.into(),
    }
}

impl TokenValidator {
    /// Validator backed by the issuer's JWKS endpoint.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let jwks = JwksProvider::new(config.jwks_uri.clone(), config.allow_insecure_jwks)?;
        Ok(Self {
            keys: KeySource::Jwks(jwks),
            config,
        })
    }

    /// Validator that trusts a single RSA public key, whatever the `kid`.
    pub fn with_static_key(key_pem: &[u8], config: AuthConfig) -> AuthResult<Self> {
        let key = DecodingKey::from_rsa_pem(key_pem).map_err(|e| AuthError::Config {
            reason: format!("invalid RSA public key: {e}"),
        })?;
        Ok(Self {
            keys: KeySource::Static(Arc::new(key)),
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Structure problems are `Malformed`; everything about trust is `Rejected`.
    pub async fn validate(&self, token: &str) -> AuthResult<Claims> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(malformed("token is not three dot-separated segments"));
        }
        let header_json = URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|_| malformed("header segment is not base64url"))?;
        let raw_header: serde_json::Value = serde_json::from_slice(&header_json)
            .map_err(|_| malformed("header segment is not JSON"))?;
        let Some(obj) = raw_header.as_object() else {
            return Err(malformed("header is not a JSON object"));
        };

        // inspected before decode_header, which drops fields it does not model
        if obj.contains_key("crit") {
            return Err(rejected("critical header extensions are not supported"));
        }
        if ["jku", "jwk", "x5u", "x5c"].iter().any(|k| obj.contains_key(*k)) {
            return Err(rejected("token carries key-location headers"));
        }
        match obj.get("alg").and_then(|v| v.as_str()) {
            Some("RS256") | Some("ES256") => {}
            Some(other) => return Err(rejected(format!("algorithm {other} not allowed"))),
            None => return Err(rejected("missing alg header")),
        }

        let header = decode_header(token).map_err(|e| malformed(format!("header: {e}")))?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
            return Err(rejected(format!("algorithm {:?} not allowed", header.alg)));
        }

        // RFC 9068 allows at+jwt; Auth0 sends JWT
        if let Some(typ) = &header.typ {
            let t = typ.to_ascii_lowercase();
            if t != "jwt" && t != "at+jwt" && t != "application/at+jwt" {
                return Err(rejected(format!("token type '{typ}' not accepted")));
            }
        }

        let key = match &self.keys {
            KeySource::Static(key) => Arc::clone(key),
            KeySource::Jwks(jwks) => {
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| rejected("missing kid header"))?;
                jwks.get_key(kid).await?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.config.leeway.as_secs();
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&self.config.audience);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| rejected(format!("validation failed: {e}")))?;
        Ok(data.claims)
    }
}
