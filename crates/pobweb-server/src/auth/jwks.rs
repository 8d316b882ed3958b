use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{AuthError, AuthResult};

const MAX_JWKS_BYTES: usize = 512 * 1024;
const MAX_CACHED_KEYS: u64 = 100;
const KEY_TTL: Duration = Duration::from_secs(3600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    crv: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

impl Jwk {
    /// RSA (`n`, `e`) or EC P-256 (`x`, `y`); anything else is skipped.
    fn decoding_key(&self) -> Option<DecodingKey> {
        match self.kty.as_str() {
            "RSA" => {
                let (n, e) = (self.n.as_deref()?, self.e.as_deref()?);
                DecodingKey::from_rsa_components(n, e).ok()
            }
            "EC" if self.crv.as_deref() == Some("P-256") => {
                let (x, y) = (self.x.as_deref()?, self.y.as_deref()?);
                DecodingKey::from_ec_components(x, y).ok()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Signing keys of the issuer, by key id.
///
/// A lookup miss triggers a refetch of the whole key set. Concurrent misses
/// may each refetch; the results are identical.
#[derive(Clone)]
pub struct JwksProvider {
    cache: Cache<String, Arc<DecodingKey>>,
    client: Client,
    jwks_uri: Url,
}

impl std::fmt::Debug for JwksProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksProvider")
            .field("jwks_uri", &self.jwks_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl JwksProvider {
    pub fn new(jwks_uri: Url, allow_insecure: bool) -> AuthResult<Self> {
        if !allow_insecure {
            validate_uri(&jwks_uri)?;
        }

        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("pobweb-server/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config {
                reason: format!("http client: {e}"),
            })?;

        Ok(Self {
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_KEYS)
                .time_to_live(KEY_TTL)
                .build(),
            client,
            jwks_uri,
        })
    }

    pub async fn get_key(&self, kid: &str) -> AuthResult<Arc<DecodingKey>> {
        if let Some(key) = self.cache.get(kid) {
            return Ok(key);
        }

        self.refresh().await?;

        self.cache.get(kid).ok_or_else(|| AuthError::Rejected {
            reason: format!("no signing key for kid '{kid}'"),
        })
    }

    async fn refresh(&self) -> AuthResult<()> {
        tracing::info!(event = "jwks_refresh", uri = %self.jwks_uri);
        let fetch_failed = |e: reqwest::Error| AuthError::Rejected {
            reason: format!("jwks fetch failed: {e}"),
        };

        let mut resp = self
            .client
            .get(self.jwks_uri.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_failed)?;

        if let Some(len) = resp.content_length() {
            if len > MAX_JWKS_BYTES as u64 {
                return Err(too_large(len as usize));
            }
        }
        // content-length may be absent or wrong
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(fetch_failed)? {
            body.extend_from_slice(&chunk);
            if body.len() > MAX_JWKS_BYTES {
                return Err(too_large(body.len()));
            }
        }

        let jwks: JwksResponse = serde_json::from_slice(&body).map_err(|e| AuthError::Rejected {
            reason: format!("jwks is not a key set: {e}"),
        })?;

        let mut loaded = 0usize;
        for jwk in &jwks.keys {
            let (Some(kid), Some(key)) = (jwk.kid.as_ref(), jwk.decoding_key()) else {
                continue;
            };
            self.cache.insert(kid.clone(), Arc::new(key));
            loaded += 1;
        }
        tracing::debug!(event = "jwks_loaded", keys = loaded);
        Ok(())
    }
}

fn too_large(size: usize) -> AuthError {
    AuthError::Rejected {
        reason: format!("jwks response too large: {size} bytes"),
    }
}

/// JWKS must come over https from a public host.
pub(crate) fn validate_uri(uri: &Url) -> AuthResult<()> {
    if uri.scheme() != "https" {
        return Err(AuthError::Config {
            reason: format!("jwks uri must use https, got '{}'", uri.scheme()),
        });
    }
    let unsafe_host = match uri.host() {
        Some(url::Host::Ipv4(addr)) => is_unsafe_ip(&IpAddr::V4(addr)),
        Some(url::Host::Ipv6(addr)) => is_unsafe_ip(&IpAddr::V6(addr)),
        Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        None => true,
    };
    if unsafe_host {
        return Err(AuthError::Config {
            reason: format!("jwks uri points at a local or private host: {uri}"),
        });
    }
    Ok(())
}

fn is_unsafe_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            let o = addr.octets();
            addr.is_loopback()
                || addr.is_link_local()
                || addr.is_multicast()
                || addr.is_unspecified()
                || o[0] == 10
                || (o[0] == 192 && o[1] == 168)
                || (o[0] == 172 && (16..=31).contains(&o[1]))
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_multicast()
                || addr.is_unspecified()
                // fc00::/7
                || (addr.segments()[0] & 0xfe00) == 0xfc00
                || (addr.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
