//! Core types shared across the retrieval and answer pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a participant role in a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }
}

/// Token counts reported by the model endpoint for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a usage record, deriving the total from its parts.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
}

impl CompletionRequest {
    /// A single-turn request carrying one user-role message.
    pub fn single_turn(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            model: model.into(),
        }
    }
}

/// The result of an LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Relevance classification produced by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relevance {
    NonRelevant,
    PartlyRelevant,
    Relevant,
    /// The evaluator's output could not be parsed.
    Unknown,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::NonRelevant => "NON_RELEVANT",
            Relevance::PartlyRelevant => "PARTLY_RELEVANT",
            Relevance::Relevant => "RELEVANT",
            Relevance::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relevance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NON_RELEVANT" => Ok(Relevance::NonRelevant),
            "PARTLY_RELEVANT" => Ok(Relevance::PartlyRelevant),
            "RELEVANT" => Ok(Relevance::Relevant),
            "UNKNOWN" => Ok(Relevance::Unknown),
            other => Err(format!("unrecognised relevance label '{other}'")),
        }
    }
}

/// The durable result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer: String,
    pub model_used: String,
    /// Seconds from the start of retrieval to the end of evaluation.
    pub response_time: f64,
    pub relevance: Relevance,
    pub relevance_explanation: String,
    pub answer_usage: TokenUsage,
    pub eval_usage: TokenUsage,
    /// Summed USD cost of both calls; `None` when any component price is unknown.
    pub cost: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(TokenUsage::default().total_tokens, 0);
    }

    #[test]
    fn test_relevance_serde_labels() {
        let json = serde_json::to_string(&Relevance::PartlyRelevant).unwrap();
        assert_eq!(json, "\"PARTLY_RELEVANT\"");
        let parsed: Relevance = serde_json::from_str("\"NON_RELEVANT\"").unwrap();
        assert_eq!(parsed, Relevance::NonRelevant);
    }

    #[test]
    fn test_relevance_from_str() {
        assert_eq!("RELEVANT".parse::<Relevance>(), Ok(Relevance::Relevant));
        assert_eq!(" UNKNOWN ".parse::<Relevance>(), Ok(Relevance::Unknown));
        assert!("relevant-ish".parse::<Relevance>().is_err());
    }

    #[test]
    fn test_single_turn_request() {
        let req = CompletionRequest::single_turn("hello", "gpt-4o-mini");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.model, "gpt-4o-mini");
    }
}
