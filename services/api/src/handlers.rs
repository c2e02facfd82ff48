//! Axum Handlers for the REST API
//!
//! Thin wrappers over the session registry. Every failure is mapped to an
//! `ApiError`, which renders as `{"message": ...}` with a matching status.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mot_core::{
    AdapterError, Catalog, EvaluationError, EvaluationReport, SessionError, SessionSnapshot,
    TrainingSession, catalog::CatalogError,
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    models::{CancelResponse, CreateSessionPayload, ErrorResponse, SubmitTurnPayload},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    BadGateway(String),
    GatewayTimeout(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadGateway(message) | ApiError::GatewayTimeout(message) => {
                error!(%status, "Backend failure: {}", message);
                message
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::Unprocessable(message) => message,
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

fn from_adapter(err: &AdapterError, message: String) -> ApiError {
    match err {
        AdapterError::Timeout(_) => ApiError::GatewayTimeout(message),
        AdapterError::Cancelled => ApiError::Conflict(message),
        AdapterError::Backend(_) | AdapterError::EmptyResponse => ApiError::BadGateway(message),
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match &err {
            SessionError::EmptyInput => ApiError::BadRequest(message),
            SessionError::Busy | SessionError::Finished => ApiError::Conflict(message),
            SessionError::NothingToEvaluate => ApiError::Unprocessable(message),
            SessionError::Adapter(inner) => from_adapter(inner, message),
            SessionError::Evaluation(EvaluationError::Backend(inner)) => {
                from_adapter(inner, message)
            }
            SessionError::Evaluation(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<TrainingSession>, ApiError> {
    state
        .registry
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

/// List the industries, personas and voices a session can be built from.
#[utoipa::path(
    get,
    path = "/catalog",
    responses(
        (status = 200, description = "Scenario catalog", body = Catalog)
    )
)]
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Catalog> {
    Json(state.catalog.as_ref().clone())
}

/// Start a training session; the customer speaks first.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session started", body = SessionSnapshot),
        (status = 400, description = "Unknown catalog id", body = ErrorResponse),
        (status = 502, description = "Backend failure", body = ErrorResponse),
        (status = 504, description = "Backend timed out", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let scenario = state.catalog.scenario(
        &payload.industry_id,
        &payload.persona_id,
        payload.voice_id.as_deref(),
    )?;
    let session = state.registry.start(scenario).await?;
    Ok((StatusCode::CREATED, Json(session.snapshot())))
}

/// Get the current state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionSnapshot),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.snapshot()))
}

/// Submit the trainee's reply and receive the customer's answer and advice.
#[utoipa::path(
    post,
    path = "/sessions/{id}/turns",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "Updated session", body = SessionSnapshot),
        (status = 400, description = "Empty input", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session busy, finished or call cancelled", body = ErrorResponse),
        (status = 502, description = "Backend failure", body = ErrorResponse),
        (status = 504, description = "Backend timed out", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitTurnPayload>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = find_session(&state, id).await?;
    session.submit_turn(&payload.text).await?;
    Ok(Json(session.snapshot()))
}

/// Cancel the outstanding backend call of a session, if any.
#[utoipa::path(
    post,
    path = "/sessions/{id}/cancel",
    responses(
        (status = 200, description = "Cancellation result", body = CancelResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(CancelResponse {
        cancelled: session.cancel(),
    }))
}

/// End the conversation and request the evaluation report.
#[utoipa::path(
    post,
    path = "/sessions/{id}/finish",
    responses(
        (status = 200, description = "Evaluation report", body = EvaluationReport),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session busy or already finished", body = ErrorResponse),
        (status = 422, description = "No trainee turn to evaluate", body = ErrorResponse),
        (status = 502, description = "Backend or report failure", body = ErrorResponse),
        (status = 504, description = "Backend timed out", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn finish_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EvaluationReport>, ApiError> {
    let session = find_session(&state, id).await?;
    let report = session.finish().await?;
    Ok(Json(report))
}

/// Discard a session. Deleting an unknown session is not an error.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session discarded")
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if !state.registry.reset(id).await {
        warn!(session_id = %id, "Reset of unknown session ignored");
    }
    StatusCode::NO_CONTENT
}
