//! Gateway HTTP handlers.

use {
    axum::{
        Extension, Json,
        extract::{Path, Query, State, rejection::JsonRejection},
        http::{HeaderMap, header::CONTENT_TYPE},
        response::{IntoResponse, Response},
    },
    secrecy::ExposeSecret,
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{debug, info},
    wabridge_sessions::{OutboundMessage, OutboundSender},
};

use crate::{
    error::ApiError,
    media,
    session::{self, ClientQuery, ClientSession},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendFileRequest {
    pub recipient: String,
    /// Caption.
    #[serde(default)]
    pub content: String,
    /// Base64 data URL.
    pub media: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookUpdate {
    pub webhook: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub purge_cache: bool,
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        debug!(error = %rejection, "rejected payload");
        ApiError::BadRequest("payload is required!".into())
    })
}

pub async fn welcome() -> &'static str {
    "welcome to whatsapp api gateway"
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.sessions.session_count(),
    }))
}

/// The login QR code while logged out (falling back to a screenshot when no
/// code can be rendered), otherwise a screenshot.
pub async fn screen(
    State(state): State<AppState>,
    Extension(session): Extension<ClientSession>,
) -> Result<Response, ApiError> {
    let dir = &state.settings.static_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("screen_{}.png", session.client_id));

    let mut rendered = false;
    if !session.status.is_logged_in() {
        match session.driver.get_qr(&path).await {
            Ok(()) => rendered = true,
            Err(e) => {
                debug!(client_id = %session.client_id, error = %e, "no QR code, taking screenshot");
            },
        }
    }
    if !rendered {
        session.driver.screenshot(&path).await?;
    }

    let png = tokio::fs::read(&path).await?;
    Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
}

pub async fn send_chat(
    State(state): State<AppState>,
    Extension(session): Extension<ClientSession>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    session.require_login()?;
    let req = payload(body)?;
    state.sessions.queue_outbound(
        &session.client_id,
        OutboundMessage::text(req.recipient, req.content),
    );
    Ok(Json(json!({ "status": true })))
}

pub async fn send_file(
    State(state): State<AppState>,
    Extension(session): Extension<ClientSession>,
    body: Result<Json<SendFileRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    session.require_login()?;
    let req = payload(body)?;
    let path = media::save_media(&state.settings.media_dir, &req.filename, &req.media).await?;
    let sent = OutboundSender::new(session.driver)
        .send(&OutboundMessage::media(req.recipient, req.content, path))
        .await;
    Ok(Json(json!({ "status": sent })))
}

pub async fn info(
    State(state): State<AppState>,
    Extension(session): Extension<ClientSession>,
) -> Json<Value> {
    let config = &session.config;
    Json(json!({
        "client": config.client,
        "token": config.token.expose_secret(),
        "webhook": config.webhook_enabled,
        "webhook_url": config.webhook_url,
        "status": state.sessions.client_info(&session.client_id).await,
    }))
}

pub async fn get_webhook(Extension(session): Extension<ClientSession>) -> Json<Value> {
    Json(json!({
        "webhook": session.config.webhook_enabled,
        "webhook_url": session.config.webhook_url,
    }))
}

pub async fn set_webhook(
    State(state): State<AppState>,
    Extension(session): Extension<ClientSession>,
    body: Result<Json<WebhookUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let update = payload(body)?;
    let config = state
        .store
        .update_webhook(&session.client_id, update.webhook, update.webhook_url)
        .await?;
    info!(client_id = %session.client_id, enabled = config.webhook_enabled, "webhook updated");
    Ok(Json(json!({
        "webhook": config.webhook_enabled,
        "webhook_url": config.webhook_url,
    })))
}

/// Tear down a client's session. Requires the default client's token.
pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let admin = ClientQuery {
        client: None,
        token: query.token,
    };
    session::authenticate(&state, &admin, &headers).await?;
    let deleted = state.sessions.delete(&client_id, query.purge_cache).await?;
    Ok(Json(json!({ "client": client_id, "deleted": deleted })))
}
