//! HTTP surface of the virtual file store.
//!
//! `/api/vfs` carries per-entry metadata in the `x-metadata` header and
//! replaces on write. `/api/kv` is bytes only and refuses to replace an
//! existing entry unless `?overwrite=true`. Both serve the same entries.

use axum::extract::{DefaultBodyLimit, Extension, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use pobweb_vfs::{parse_metadata_header, Listing, Metadata, Owner, PutResult, Subject, VfsProfile};
use serde::Deserialize;

use crate::error::ApiError;
use crate::gate;
use crate::state::AppState;

pub const METADATA_HEADER: HeaderName = HeaderName::from_static("x-metadata");
pub const NAMESPACE_HEADER: HeaderName = HeaderName::from_static("x-user-namespace");

pub fn router(state: AppState) -> Router {
    let body_limit = state.vfs.limits().max_value_bytes;

    let api = Router::new()
        .route("/api/vfs", get(list_vfs))
        .route(
            "/api/vfs/{*path}",
            get(get_vfs).head(head_vfs).put(put_vfs).delete(delete_entry),
        )
        .route("/api/kv", get(list_kv))
        .route(
            "/api/kv/{*path}",
            get(get_kv).head(head_kv).put(put_kv).delete(delete_entry),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_subject,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    prefix: String,
}

#[derive(Debug, Default, Deserialize)]
struct PutQuery {
    overwrite: Option<bool>,
}

fn owner(subject: Subject, headers: &HeaderMap) -> Result<Owner, ApiError> {
    let namespace = match headers.get(&NAMESPACE_HEADER) {
        None => None,
        Some(v) => {
            let ns = v
                .to_str()
                .map_err(|_| ApiError::BadRequest("namespace is not ascii".into()))?
                .trim();
            (!ns.is_empty()).then(|| ns.to_string())
        }
    };
    Ok(Owner::new(subject, namespace))
}

/// Metadata as a header value. Non-ASCII is `\u`-escaped, which keeps the JSON
/// equivalent and the header valid.
fn metadata_header(metadata: Option<&Metadata>) -> Result<HeaderValue, ApiError> {
    let json = serde_json::to_string(&metadata).map_err(|e| {
        tracing::error!(event = "metadata_encode_failed", error = %e);
        ApiError::Unavailable
    })?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    HeaderValue::try_from(out).map_err(|_| ApiError::Unavailable)
}

async fn list_vfs(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let owner = owner(subject, &headers)?;
    let listing = state.vfs.list(&owner, &q.prefix, VfsProfile::METADATA).await?;
    Ok(Json(listing))
}

async fn list_kv(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let owner = owner(subject, &headers)?;
    let listing = state.vfs.list(&owner, &q.prefix, VfsProfile::PLAIN).await?;
    Ok(Json(listing.into_iter().map(|l| l.name).collect()))
}

async fn head_entry(
    state: &AppState,
    owner: &Owner,
    path: &str,
    profile: VfsProfile,
) -> Result<Response, ApiError> {
    let metadata = state.vfs.head(owner, path, profile).await?;
    let mut resp = StatusCode::OK.into_response();
    if profile.supports_metadata {
        let value = metadata_header(metadata.as_ref())?;
        resp.headers_mut().insert(METADATA_HEADER, value);
    }
    Ok(resp)
}

async fn get_entry(
    state: &AppState,
    owner: &Owner,
    path: &str,
    profile: VfsProfile,
) -> Result<Response, ApiError> {
    let entry = state.vfs.get(owner, path, profile).await?;
    let mut resp = (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/octet-stream")],
        entry.value,
    )
        .into_response();
    if profile.supports_metadata {
        let value = metadata_header(entry.metadata.as_ref())?;
        resp.headers_mut().insert(METADATA_HEADER, value);
    }
    Ok(resp)
}

async fn put_entry(
    state: &AppState,
    owner: &Owner,
    path: &str,
    headers: &HeaderMap,
    overwrite: Option<bool>,
    body: Bytes,
    profile: VfsProfile,
) -> Result<StatusCode, ApiError> {
    let metadata = match headers.get(&METADATA_HEADER) {
        Some(raw) if profile.supports_metadata => {
            let raw = raw
                .to_str()
                .map_err(|_| ApiError::BadRequest("metadata header is not ascii".into()))?;
            Some(parse_metadata_header(
                raw,
                state.vfs.limits().max_metadata_bytes,
            )?)
        }
        _ => None,
    };
    match state
        .vfs
        .put(owner, path, body, metadata, profile, overwrite)
        .await?
    {
        PutResult::Written => Ok(StatusCode::NO_CONTENT),
        PutResult::Rejected => Err(ApiError::Conflict),
    }
}

async fn head_vfs(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(subject, &headers)?;
    head_entry(&state, &owner, &path, VfsProfile::METADATA).await
}

async fn get_vfs(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(subject, &headers)?;
    get_entry(&state, &owner, &path, VfsProfile::METADATA).await
}

async fn put_vfs(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    Query(q): Query<PutQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let owner = owner(subject, &headers)?;
    put_entry(&state, &owner, &path, &headers, q.overwrite, body, VfsProfile::METADATA).await
}

async fn head_kv(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(subject, &headers)?;
    head_entry(&state, &owner, &path, VfsProfile::PLAIN).await
}

async fn get_kv(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(subject, &headers)?;
    get_entry(&state, &owner, &path, VfsProfile::PLAIN).await
}

async fn put_kv(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    Query(q): Query<PutQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let owner = owner(subject, &headers)?;
    put_entry(&state, &owner, &path, &headers, q.overwrite, body, VfsProfile::PLAIN).await
}

async fn delete_entry(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let owner = owner(subject, &headers)?;
    state.vfs.delete(&owner, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_header_escapes_non_ascii() {
        let m = json!({"name": "Häxa ✓", "dir": true})
            .as_object()
            .unwrap()
            .clone();
        let v = metadata_header(Some(&m)).unwrap();
        let text = v.to_str().unwrap();
        assert!(text.is_ascii());
        let back: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(back, json!({"name": "Häxa ✓", "dir": true}));
    }

    #[test]
    fn test_absent_metadata_is_null() {
        assert_eq!(metadata_header(None).unwrap(), "null");
    }

    #[test]
    fn test_namespace_header() {
        let sub = Subject::new("u").unwrap();
        let mut h = HeaderMap::new();
        assert_eq!(owner(sub.clone(), &h).unwrap().namespace, None);
        h.insert(NAMESPACE_HEADER, HeaderValue::from_static("poe2"));
        assert_eq!(owner(sub.clone(), &h).unwrap().namespace.as_deref(), Some("poe2"));
        h.insert(NAMESPACE_HEADER, HeaderValue::from_static("  "));
        assert_eq!(owner(sub, &h).unwrap().namespace, None);
    }
}
