//! Request and response bodies of the REST API.
//!
//! Session views, catalog entries and reports are the core types themselves;
//! only the payload wrappers live here.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateSessionPayload {
    #[schema(example = "banking")]
    pub industry_id: String,
    #[schema(example = "angry_elder")]
    pub persona_id: String,
    #[schema(example = "v1")]
    pub voice_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SubmitTurnPayload {
    /// Typed text or the final speech transcript.
    #[schema(example = "非常抱歉给您带来不便，请问具体是哪笔业务出了问题？")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct CancelResponse {
    /// Whether a call was outstanding and got cancelled.
    pub cancelled: bool,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
