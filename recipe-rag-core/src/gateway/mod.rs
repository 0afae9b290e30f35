//! # HTTP Gateway
//!
//! JSON API in front of the pipeline: questions, feedback, health.

mod server;

pub use server::{
    AppState, FeedbackRequest, FeedbackResponse, QuestionRequest, QuestionResponse, router, run,
};

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
