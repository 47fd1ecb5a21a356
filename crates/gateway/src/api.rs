//! The chat relay endpoint and its wire types.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use luminous_agent::{AdvanceFailure, Exchange, Input};
use luminous_core::error::Error;
use luminous_core::message::History;
use luminous_core::session::Session;
use luminous_core::state::InternalState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::SharedState;

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Client-held history. When present the call is stateless.
    #[serde(default)]
    pub history: Option<History>,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub is_reflection: bool,

    /// Client-held state, merged field by field onto the defaults
    #[serde(default)]
    pub internal_state: Option<Map<String, Value>>,

    #[serde(default)]
    pub keepsake: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// `null` when a reflection had nothing to add
    pub response_text: Option<String>,
    pub updated_state: Value,
    pub keepsake: Option<String>,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_history: Option<History>,
    pub saved: bool,
    pub tool_messages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub internal_state: Value,
    pub keepsake: Option<String>,
    pub turns: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            logs: Vec::new(),
        }),
    )
}

fn failure(failure: AdvanceFailure) -> ApiError {
    let status = match failure.error {
        Error::Busy => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(kind = failure.error.kind(), error = %failure.error, "Chat request failed");
    (
        status,
        Json(ErrorResponse {
            error: format!("{}: {}", failure.error.kind(), failure.error),
            logs: failure.log,
        }),
    )
}

impl ChatResponse {
    fn from_exchange(exchange: Exchange, stateless: bool) -> Self {
        let Exchange {
            reply,
            session,
            log,
            tool_messages,
            saved,
            ..
        } = exchange;
        Self {
            response_text: reply,
            updated_state: session.state.to_json(),
            keepsake: session.keepsake,
            logs: log,
            new_history: stateless.then_some(session.history),
            saved,
            tool_messages,
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| error(StatusCode::BAD_REQUEST, format!("Invalid request: {e}")))?;

    let input = if request.is_reflection {
        Input::Reflection
    } else if request.message.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "message is required"));
    } else {
        Input::Message(request.message)
    };

    info!(
        stateless = request.history.is_some(),
        reflection = input.is_reflection(),
        "Chat request"
    );

    let (exchange, stateless) = match request.history {
        Some(history) => {
            let mut internal = InternalState::default();
            if let Some(delta) = &request.internal_state {
                internal.merge(delta);
            }
            let session = Session::new(history)
                .with_state(internal)
                .with_keepsake(request.keepsake);
            (state.runner.submit_detached(&session, input).await, true)
        }
        None => {
            let exchange = match input {
                Input::Reflection => state.runner.try_reflect().await,
                Input::Message(message) => state.runner.submit(message).await,
            };
            (exchange, false)
        }
    };

    exchange
        .map(|e| Json(ChatResponse::from_exchange(e, stateless)))
        .map_err(failure)
}

pub async fn state_handler(State(state): State<SharedState>) -> Json<StateResponse> {
    let session = state.runner.snapshot().await;
    Json(StateResponse {
        internal_state: session.state.to_json(),
        keepsake: session.keepsake,
        turns: session.history.len(),
    })
}

pub async fn method_not_allowed() -> impl IntoResponse {
    error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
