//! HTTP gateway server built on axum.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::GatewayConfig;
use crate::conversations::{Conversation, ConversationLog, Feedback};
use crate::error::{RagError, ValidationError};
use crate::pipeline::RagPipeline;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub conversations: Arc<dyn ConversationLog>,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, conversations: Arc<dyn ConversationLog>) -> Self {
        Self {
            pipeline,
            conversations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub conversation_id: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub conversation_id: String,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub conversation_id: String,
    pub feedback: String,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(err: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: err.to_string(),
        }
    }

    fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Error processing {}: {}", context, err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Build the axum router for the gateway.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/question", post(question_handler))
        .route("/feedback", post(feedback_handler));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the recipe assistant application!" }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn question_handler(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request(ValidationError::EmptyQuestion));
    }
    state
        .pipeline
        .check_limit(request.limit)
        .map_err(ApiError::bad_request)?;

    let record = state
        .pipeline
        .answer(&request.question, request.model.as_deref(), request.limit)
        .await
        .map_err(|e| match e {
            RagError::Validation(v) => ApiError::bad_request(v),
            other => {
                error!(error = %other, "Pipeline failed");
                ApiError::internal("question", other)
            }
        })?;

    let conversation = Conversation::new(request.question, record);
    if let Err(e) = state.conversations.record_conversation(&conversation).await {
        warn!(id = %conversation.id, error = %e, "Failed to record conversation");
    }
    info!(id = %conversation.id, relevance = %conversation.record.relevance, "Answered");

    Ok(Json(QuestionResponse {
        conversation_id: conversation.id,
        question: conversation.question,
        answer: conversation.record.answer,
    }))
}

async fn feedback_handler(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    if request.conversation_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            ValidationError::MissingConversationId,
        ));
    }

    let feedback = Feedback::new(request.conversation_id, request.feedback);
    state
        .conversations
        .record_feedback(&feedback)
        .await
        .map_err(|e| ApiError::internal("feedback", e))?;
    info!(conversation_id = %feedback.conversation_id, "Received feedback");

    Ok(Json(FeedbackResponse {
        conversation_id: feedback.conversation_id,
        feedback: feedback.feedback,
    }))
}

/// Start the gateway on `config.host:config.port`.
pub async fn run(state: AppState, config: &GatewayConfig) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
