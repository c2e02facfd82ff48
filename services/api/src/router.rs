//! Axum Router Configuration
//!
//! Routes of the REST API plus the Swagger UI and OpenAPI document.

use crate::{
    handlers,
    models::{CancelResponse, CreateSessionPayload, ErrorResponse, SubmitTurnPayload},
    state::AppState,
};
use mot_core::{
    CoachAdvice, EvaluationReport, Scenario, SessionSnapshot, SessionStatus, Speaker, Stage,
    Turn,
    catalog::{Catalog, Difficulty, Industry, Persona, VoiceOption},
    report::{KeyMoment, MomentKind},
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_catalog,
        handlers::create_session,
        handlers::get_session,
        handlers::submit_turn,
        handlers::cancel_session,
        handlers::finish_session,
        handlers::reset_session,
    ),
    components(
        schemas(
            Catalog, Industry, Persona, VoiceOption, Difficulty, Scenario,
            SessionSnapshot, SessionStatus, Turn, Speaker, Stage, CoachAdvice,
            EvaluationReport, KeyMoment, MomentKind,
            CreateSessionPayload, SubmitTurnPayload, CancelResponse, ErrorResponse
        )
    ),
    tags(
        (name = "MOT Trainer API", description = "Customer-service training sessions with a simulated customer")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/catalog", get(handlers::get_catalog))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::reset_session),
        )
        .route("/sessions/{id}/turns", post(handlers::submit_turn))
        .route("/sessions/{id}/cancel", post(handlers::cancel_session))
        .route("/sessions/{id}/finish", post(handlers::finish_session))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
