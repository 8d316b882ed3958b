use std::time::Duration;

use url::Url;

use super::{AuthError, AuthResult};

pub const DEFAULT_ISSUER: &str = "https://pob-web.us.auth0.com/";
pub const DEFAULT_AUDIENCE: &str = "https://pob.cool/api";
const DEFAULT_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Exact `iss` the token must carry.
    pub issuer: String,
    /// Any one of these must appear in `aud`.
    pub audience: Vec<String>,
    pub jwks_uri: Url,
    pub leeway: Duration,
    /// Permit plain http and private hosts for the JWKS endpoint.
    pub allow_insecure_jwks: bool,
}

impl AuthConfig {
    pub fn new(issuer: impl Into<String>, audience: Vec<String>) -> AuthResult<Self> {
        let issuer = issuer.into();
        let jwks_uri = default_jwks_uri(&issuer)?;
        Ok(Self {
            issuer,
            audience,
            jwks_uri,
            leeway: Duration::from_secs(DEFAULT_LEEWAY_SECS),
            allow_insecure_jwks: false,
        })
    }

    /// Read `POBWEB_AUTH_*` from the process environment.
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AuthResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let issuer = get("POBWEB_AUTH_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        let audience: Vec<String> = get("POBWEB_AUTH_AUDIENCE")
            .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if audience.is_empty() {
            return Err(AuthError::Config {
                reason: "POBWEB_AUTH_AUDIENCE names no audience".into(),
            });
        }

        let jwks_uri = match get("POBWEB_AUTH_JWKS_URI") {
            Some(raw) => Url::parse(&raw).map_err(|e| AuthError::Config {
                reason: format!("invalid POBWEB_AUTH_JWKS_URI: {e}"),
            })?,
            None => default_jwks_uri(&issuer)?,
        };

        let leeway = match get("POBWEB_AUTH_LEEWAY_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| AuthError::Config {
                reason: format!("invalid POBWEB_AUTH_LEEWAY_SECS: {e}"),
            })?,
            None => DEFAULT_LEEWAY_SECS,
        };

        let allow_insecure_jwks = get("POBWEB_AUTH_ALLOW_INSECURE_JWKS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            issuer,
            audience,
            jwks_uri,
            leeway: Duration::from_secs(leeway),
            allow_insecure_jwks,
        })
    }
}

/// `{issuer}/.well-known/jwks.json`, tolerating a trailing slash on the issuer.
fn default_jwks_uri(issuer: &str) -> AuthResult<Url> {
    let base = issuer.trim_end_matches('/');
    Url::parse(&format!("{base}/.well-known/jwks.json")).map_err(|e| AuthError::Config {
        reason: format!("issuer '{issuer}' is not a URL: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AuthConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.issuer, DEFAULT_ISSUER);
        assert_eq!(cfg.audience, vec![DEFAULT_AUDIENCE.to_string()]);
        assert_eq!(
            cfg.jwks_uri.as_str(),
            "https://pob-web.us.auth0.com/.well-known/jwks.json"
        );
        assert_eq!(cfg.leeway, Duration::from_secs(30));
        assert!(!cfg.allow_insecure_jwks);
    }

    #[test]
    fn test_overrides() {
        let cfg = AuthConfig::from_lookup(lookup(&[
            ("POBWEB_AUTH_ISSUER", "https://id.example.com"),
            ("POBWEB_AUTH_AUDIENCE", "a, b,,c"),
            ("POBWEB_AUTH_LEEWAY_SECS", "5"),
            ("POBWEB_AUTH_ALLOW_INSECURE_JWKS", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.audience, ["a", "b", "c"]);
        assert_eq!(
            cfg.jwks_uri.as_str(),
            "https://id.example.com/.well-known/jwks.json"
        );
        assert_eq!(cfg.leeway, Duration::from_secs(5));
        assert!(cfg.allow_insecure_jwks);
    }

    #[test]
    fn test_explicit_jwks_uri_wins() {
        let cfg = AuthConfig::from_lookup(lookup(&[(
            "POBWEB_AUTH_JWKS_URI",
            "https://keys.example.com/jwks",
        )]))
        .unwrap();
        assert_eq!(cfg.jwks_uri.as_str(), "https://keys.example.com/jwks");
    }

    #[test]
    fn test_invalid_values() {
        assert!(AuthConfig::from_lookup(lookup(&[("POBWEB_AUTH_LEEWAY_SECS", "soon")])).is_err());
        assert!(AuthConfig::from_lookup(lookup(&[("POBWEB_AUTH_AUDIENCE", " , ")])).is_err());
        assert!(AuthConfig::from_lookup(lookup(&[("POBWEB_AUTH_JWKS_URI", "not a url")])).is_err());
    }
}
