use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Query, Request, State},
    http::{request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState, users::model::User};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_LEN: usize = 20;

/// Upper bound when buffering a body to look for an `api_key` field.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Fresh random key: 20 ASCII alphanumeric characters.
pub fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

/// The authenticated user for the current request.
#[derive(Debug, Clone)]
pub struct Principal(pub User);

impl Principal {
    pub fn user(&self) -> &User {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by `require_api_key`; absent means the route is not behind it.
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn key_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
}

fn key_from_query(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<ApiKeyQuery>::try_from_uri(uri).ok()?;
    query.api_key.as_deref().and_then(non_empty)
}

fn key_from_body(bytes: &[u8]) -> Option<String> {
    let body: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    body.get("api_key")?.as_str().and_then(non_empty)
}

/// Header first, then query string, then JSON body. The body is buffered and
/// put back so handlers can still read it.
async fn candidate_key(req: Request) -> Result<(Option<String>, Request), ApiError> {
    if let Some(key) = key_from_headers(req.headers()).or_else(|| key_from_query(req.uri())) {
        return Ok((Some(key), req));
    }
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Unreadable request body: {e}")))?;
    let key = key_from_body(&bytes);
    Ok((key, Request::from_parts(parts, Body::from(bytes))))
}

/// Resolves the request's API key to a user and stores it as the [`Principal`].
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (candidate, mut req) = candidate_key(req).await?;
    let Some(candidate) = candidate else {
        warn!(uri = %req.uri(), "request without api key");
        return Err(ApiError::Unauthenticated);
    };

    let user = match state.store.find_by_api_key(&candidate).await? {
        Some(user) => user,
        None => {
            warn!(uri = %req.uri(), "unknown api key");
            return Err(ApiError::Unauthenticated);
        }
    };

    debug!(user_id = %user.id, role = user.role.as_str(), "api key resolved");
    req.extensions_mut().insert(Principal(user));
    Ok(next.run(req).await)
}
