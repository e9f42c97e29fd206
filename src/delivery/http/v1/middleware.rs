use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::usecase::contracts::ApiKeyRepository;
use crate::usecase::error::UsecaseError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Owner of the API key that authorized the request.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeyQuery {
    apikey: Option<String>,
}

/// The `apikey` query parameter wins over the `x-api-key` header.
pub fn extract_api_key(headers: &HeaderMap, uri: &axum::http::Uri) -> Option<String> {
    let from_query = Query::<ApiKeyQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.apikey);

    from_query
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .filter(|key| !key.is_empty())
}

pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, UsecaseError> {
    let Some(key) = extract_api_key(request.headers(), request.uri()) else {
        tracing::warn!("missing API key");
        return Err(UsecaseError::Unauthorized("API key is required".to_string()));
    };

    let user_id = state
        .api_keys
        .find_owner(&key)
        .await?
        .ok_or_else(|| UsecaseError::Forbidden("Invalid API key".to_string()))?;

    let client = ApiClient { user_id };
    tracing::debug!(?client, "API key accepted");
    request.extensions_mut().insert(client);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri};

    #[test]
    fn test_key_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("header-key"));
        let uri: Uri = "/api/v1/properties".parse().unwrap();

        assert_eq!(extract_api_key(&headers, &uri).as_deref(), Some("header-key"));
    }

    #[test]
    fn test_query_key_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("header-key"));
        let uri: Uri = "/api/v1/properties?page=2&apikey=query-key".parse().unwrap();

        assert_eq!(extract_api_key(&headers, &uri).as_deref(), Some("query-key"));
    }

    #[test]
    fn test_missing_or_empty_key() {
        let headers = HeaderMap::new();
        let uri: Uri = "/api/v1/properties?apikey=".parse().unwrap();

        assert!(extract_api_key(&headers, &uri).is_none());
    }
}
