use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::jwks::validate_uri;
use super::*;

const ISSUER: &str = "https://issuer.test/";
const AUDIENCE: &str = "https://pob.cool/api";

struct TestKey {
    private_pem: String,
    public_pem: String,
    n: String,
    e: String,
}

fn make_key() -> TestKey {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public = RsaPublicKey::from(&private);
    TestKey {
        private_pem: private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        public_pem: public.to_public_key_pem(LineEnding::LF).unwrap(),
        n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
    }
}

fn signing_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(make_key)
}

fn other_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(make_key)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn config() -> AuthConfig {
    AuthConfig::new(ISSUER, vec![AUDIENCE.to_string()]).unwrap()
}

fn claims() -> serde_json::Value {
    json!({
        "sub": "auth0|user-1",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now(),
        "exp": now() + 600,
    })
}

fn mint(key: &TestKey, kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("JWT".into());
    header.kid = kid.map(str::to_string);
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(key.private_pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

fn forged(header: &str) -> String {
    format!("{}.e30.c2ln", URL_SAFE_NO_PAD.encode(header))
}

fn static_validator() -> TokenValidator {
    TokenValidator::with_static_key(signing_key().public_pem.as_bytes(), config()).unwrap()
}

fn jwks_body(key: &TestKey, kid: &str) -> serde_json::Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": key.n,
            "e": key.e,
        }]
    })
}

async fn jwks_validator(server: &MockServer) -> TokenValidator {
    let mut cfg = config();
    cfg.jwks_uri = Url::parse(&format!("{}/.well-known/jwks.json", server.uri())).unwrap();
    cfg.allow_insecure_jwks = true;
    TokenValidator::new(cfg).unwrap()
}

#[tokio::test]
async fn test_valid_token() {
    let token = mint(signing_key(), None, &claims());
    let out = static_validator().validate(&token).await.unwrap();
    assert_eq!(out.sub, "auth0|user-1");
    assert_eq!(out.iss.as_deref(), Some(ISSUER));
}

#[tokio::test]
async fn test_structural_failures_are_malformed() {
    let v = static_validator();
    for token in ["", "abc", "a.b", "a..c", "a.b.c.d", "!!!.e30.c2ln"] {
        let err = v.validate(token).await.unwrap_err();
        assert!(err.is_unauthenticated(), "{token:?}: {err}");
    }
    let not_json = format!("{}.e30.c2ln", URL_SAFE_NO_PAD.encode("not json"));
    assert!(matches!(
        v.validate(&not_json).await,
        Err(AuthError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_disallowed_algorithms() {
    let v = static_validator();
    for header in [
        r#"{"alg":"none","typ":"JWT"}"#,
        r#"{"alg":"HS256","typ":"JWT"}"#,
        r#"{"typ":"JWT"}"#,
    ] {
        let err = v.validate(&forged(header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { .. }), "{header}: {err}");
    }
}

#[tokio::test]
async fn test_dangerous_headers() {
    let v = static_validator();
    for header in [
        r#"{"alg":"RS256","typ":"JWT","jku":"https://evil.test/jwks"}"#,
        r#"{"alg":"RS256","typ":"JWT","jwk":{}}"#,
        r#"{"alg":"RS256","typ":"JWT","x5u":"https://evil.test/c"}"#,
        r#"{"alg":"RS256","typ":"JWT","x5c":[]}"#,
        r#"{"alg":"RS256","typ":"JWT","crit":["exp"]}"#,
    ] {
        let err = v.validate(&forged(header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { .. }), "{header}: {err}");
    }
}

#[tokio::test]
async fn test_typ_discipline() {
    let v = static_validator();
    let err = v
        .validate(&forged(r#"{"alg":"RS256","typ":"text"}"#))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("token type 'text' not accepted"));
}

#[tokio::test]
async fn test_claim_failures_are_rejected() {
    let v = static_validator();
    let mut cases = Vec::new();

    let mut c = claims();
    c["iss"] = json!("https://someone-else.test/");
    cases.push(("issuer", c));

    let mut c = claims();
    c["aud"] = json!("https://other.test/api");
    cases.push(("audience", c));

    let mut c = claims();
    c["exp"] = json!(now() - 3600);
    cases.push(("expired", c));

    let mut c = claims();
    c.as_object_mut().unwrap().remove("exp");
    cases.push(("no exp", c));

    for (name, c) in cases {
        let err = v.validate(&mint(signing_key(), None, &c)).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { .. }), "{name}: {err}");
    }
}

#[tokio::test]
async fn test_leeway_tolerates_small_skew() {
    let v = static_validator();
    let mut c = claims();
    c["exp"] = json!(now() - 5);
    assert!(v.validate(&mint(signing_key(), None, &c)).await.is_ok());
}

#[tokio::test]
async fn test_audience_array() {
    let v = static_validator();
    let mut c = claims();
    c["aud"] = json!(["https://pob-web.us.auth0.com/userinfo", AUDIENCE]);
    assert!(v.validate(&mint(signing_key(), None, &c)).await.is_ok());
}

#[tokio::test]
async fn test_wrong_signature_is_rejected() {
    let token = mint(other_key(), None, &claims());
    let err = static_validator().validate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { .. }));
}

#[tokio::test]
async fn test_jwks_keys_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(signing_key(), "k1")))
        .expect(1)
        .mount(&server)
        .await;

    let v = jwks_validator(&server).await;
    let token = mint(signing_key(), Some("k1"), &claims());
    assert!(v.validate(&token).await.is_ok());
    assert!(v.validate(&token).await.is_ok());
}

#[tokio::test]
async fn test_unknown_kid_refetches_then_rejects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(signing_key(), "k1")))
        .expect(2)
        .mount(&server)
        .await;

    let v = jwks_validator(&server).await;
    let token = mint(signing_key(), Some("rotated"), &claims());
    for _ in 0..2 {
        let err = v.validate(&token).await.unwrap_err();
        assert!(err.to_string().contains("no signing key"), "{err}");
    }
}

#[tokio::test]
async fn test_missing_kid_with_jwks() {
    let server = MockServer::start().await;
    let v = jwks_validator(&server).await;
    let err = v
        .validate(&mint(signing_key(), None, &claims()))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Rejected { .. }));
}

#[tokio::test]
async fn test_jwks_fetch_failures_reject() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let v = jwks_validator(&server).await;
    let err = v
        .validate(&mint(signing_key(), Some("k1"), &claims()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("jwks fetch failed"), "{err}");
}

#[tokio::test]
async fn test_oversized_jwks_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(600 * 1024)))
        .mount(&server)
        .await;
    let v = jwks_validator(&server).await;
    let err = v
        .validate(&mint(signing_key(), Some("k1"), &claims()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("too large"), "{err}");
}

#[tokio::test]
async fn test_ec_keys_are_loaded() {
    let server = MockServer::start().await;
    // RFC 7517 appendix A.1
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [
                {
                    "kty": "EC",
                    "crv": "P-256",
                    "x": "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
                    "y": "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
                    "use": "enc",
                    "kid": "1"
                },
                {"kty": "oct", "kid": "sym", "k": "AAAA"}
            ]
        })))
        .mount(&server)
        .await;
    let uri = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
    let provider = JwksProvider::new(uri, true).unwrap();
    assert!(provider.get_key("1").await.is_ok());
    assert!(provider.get_key("sym").await.is_err());
}

#[test]
fn test_jwks_uri_must_be_public_https() {
    for bad in [
        "http://pob-web.us.auth0.com/.well-known/jwks.json",
        "https://127.0.0.1/jwks",
        "https://10.0.0.1/jwks",
        "https://192.168.1.1/jwks",
        "https://172.16.0.1/jwks",
        "https://169.254.169.254/latest/meta-data",
        "https://[::1]/jwks",
        "https://[fd00::1]/jwks",
        "https://localhost/jwks",
    ] {
        let uri = Url::parse(bad).unwrap();
        assert!(validate_uri(&uri).is_err(), "should refuse {bad}");
        assert!(JwksProvider::new(uri, false).is_err());
    }
    for good in [
        "https://pob-web.us.auth0.com/.well-known/jwks.json",
        "https://8.8.8.8/jwks",
        "https://172.32.0.1/jwks",
    ] {
        assert!(validate_uri(&Url::parse(good).unwrap()).is_ok(), "{good}");
    }
}

#[test]
fn test_insecure_flag_allows_local_jwks() {
    let uri = Url::parse("http://127.0.0.1:9999/jwks").unwrap();
    assert!(JwksProvider::new(uri, true).is_ok());
}

#[test]
fn test_error_classes() {
    assert!(AuthError::MissingToken.is_unauthenticated());
    assert!(AuthError::Malformed { reason: "x".into() }.is_unauthenticated());
    assert!(!AuthError::Rejected { reason: "x".into() }.is_unauthenticated());
}
