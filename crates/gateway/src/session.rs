//! Per-request session hook for client-scoped routes.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, Request, State},
        middleware::Next,
        response::Response,
    },
    serde::Deserialize,
    tracing::{debug, warn},
    wabridge_config::ApiConfig,
    wabridge_driver::{Driver, DriverStatus},
};

use crate::{auth, error::ApiError, state::AppState};

/// Client selection and credentials, from the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub client: Option<String>,
    pub token: Option<String>,
}

/// The authenticated client a request operates on.
#[derive(Clone)]
pub struct ClientSession {
    pub client_id: String,
    pub config: ApiConfig,
    pub status: DriverStatus,
    pub driver: Arc<dyn Driver>,
}

impl ClientSession {
    pub fn require_login(&self) -> Result<(), ApiError> {
        if self.status.is_logged_in() {
            Ok(())
        } else {
            Err(ApiError::NotLoggedIn)
        }
    }
}

/// Resolve and authenticate the request's client and its API config.
pub async fn authenticate(
    state: &AppState,
    query: &ClientQuery,
    headers: &axum::http::HeaderMap,
) -> Result<(String, ApiConfig), ApiError> {
    let client_id = query
        .client
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(&state.settings.default_client)
        .to_string();

    let Some(config) = state.store.get(&client_id).await? else {
        warn!(client_id = %client_id, "request for unknown client");
        return Err(ApiError::Unauthorized);
    };
    let token = auth::presented_token(query.token.as_deref(), headers);
    if !auth::authorize(&config, token.as_deref()) {
        warn!(client_id = %client_id, "invalid token");
        return Err(ApiError::Unauthorized);
    }
    Ok((client_id, config))
}

/// Authenticate, take the client's lock, make sure its driver is healthy
/// and its poller armed, then run the route. The lock is released when the
/// route returns, whatever the outcome.
pub async fn session_hook(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let query = Query::<ClientQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let (client_id, config) = authenticate(&state, &query, request.headers()).await?;

    let permit = state.sessions.acquire(&client_id).await?;
    let status = state.sessions.ensure_healthy(&client_id).await?;
    state.sessions.ensure_timer(&client_id);
    let driver = state
        .sessions
        .driver(&client_id)
        .ok_or_else(|| ApiError::BrowserClosed(client_id.clone()))?;
    debug!(client_id = %client_id, ?status, "session ready");

    request.extensions_mut().insert(ClientSession {
        client_id,
        config,
        status,
        driver,
    });
    let response = next.run(request).await;
    drop(permit);
    Ok(response)
}
