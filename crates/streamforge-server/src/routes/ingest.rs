//! Publish hooks for the RTMP ingest server.
//!
//! Compatible with nginx-rtmp `on_publish` / `on_publish_done` style
//! callbacks: a form-encoded (or JSON) body carrying `app` and `name`, or a
//! full `path`, plus any query arguments the publisher put on its URL.

use axum::extract::{Form, FromRequest, Request, State};
use axum::http::header;
use axum::Json;
use serde::{Deserialize, Serialize};

use streamforge_core::Error;

use crate::context::AppContext;
use crate::error::{ApiResponse, AppError};
use crate::ingest::PublishArgs;

#[derive(Debug, Default, Deserialize)]
pub struct HookBody {
    pub app: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub token: Option<String>,
    pub profile: Option<String>,
}

impl HookBody {
    fn stream_path(&self) -> Option<String> {
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            return Some(path.to_string());
        }
        let name = self.name.as_deref().filter(|n| !n.is_empty())?;
        Some(match self.app.as_deref().filter(|a| !a.is_empty()) {
            Some(app) => format!("/{app}/{name}"),
            None => name.to_string(),
        })
    }

    fn into_parts(self) -> Result<(String, PublishArgs), AppError> {
        let path = self
            .stream_path()
            .ok_or_else(|| Error::Validation("hook body needs 'name' or 'path'".into()))?;
        Ok((
            path,
            PublishArgs {
                token: self.token,
                profile: self.profile,
            },
        ))
    }
}

/// Accepts either a JSON or a form-encoded hook body.
pub struct HookPayload(pub HookBody);

impl<S: Send + Sync> FromRequest<S> for HookPayload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let body = if is_json {
            Json::<HookBody>::from_request(req, state)
                .await
                .map_err(|e| Error::Validation(e.body_text()))?
                .0
        } else {
            Form::<HookBody>::from_request(req, state)
                .await
                .map_err(|e| Error::Validation(e.body_text()))?
                .0
        };
        Ok(HookPayload(body))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookAck {
    pub stream_path: String,
}

/// POST /api/ingest/publish -- a non-2xx answer rejects the publisher.
pub async fn publish(
    State(ctx): State<AppContext>,
    HookPayload(body): HookPayload,
) -> Result<ApiResponse<HookAck>, AppError> {
    let (stream_path, args) = body.into_parts()?;
    ctx.ingest.on_publish_start(&stream_path, &args)?;
    Ok(ApiResponse::ok(HookAck { stream_path }))
}

/// POST /api/ingest/publish/confirmed
pub async fn publish_confirmed(
    State(ctx): State<AppContext>,
    HookPayload(body): HookPayload,
) -> Result<ApiResponse<HookAck>, AppError> {
    let (stream_path, args) = body.into_parts()?;
    ctx.ingest.on_publish_confirmed(&stream_path, &args);
    Ok(ApiResponse::ok(HookAck { stream_path }))
}

/// POST /api/ingest/publish/done
pub async fn publish_done(
    State(ctx): State<AppContext>,
    HookPayload(body): HookPayload,
) -> Result<ApiResponse<HookAck>, AppError> {
    let (stream_path, args) = body.into_parts()?;
    ctx.ingest.on_publish_end(&stream_path, &args);
    Ok(ApiResponse::ok(HookAck { stream_path }))
}
