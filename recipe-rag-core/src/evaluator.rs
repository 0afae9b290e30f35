//! Relevance evaluator: a second LLM call that grades the answer.
//!
//! Output that does not parse into a verdict degrades to
//! [`Relevance::Unknown`]; the usage of the call is always reported.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::generator::AnswerGenerator;
use crate::prompt::build_evaluation_prompt;
use crate::types::{Relevance, TokenUsage};

/// Verdict for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub relevance: Relevance,
    pub explanation: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(rename = "Relevance")]
    relevance: String,
    #[serde(rename = "Explanation", default)]
    explanation: String,
}

/// Grades answers with a fixed model through the shared generator.
#[derive(Clone)]
pub struct RelevanceEvaluator {
    generator: AnswerGenerator,
    model: String,
}

impl RelevanceEvaluator {
    pub fn new(generator: AnswerGenerator, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify `answer` against `question`.
    ///
    /// Only a failed LLM call is an error; malformed output is not.
    pub async fn evaluate(&self, question: &str, answer: &str) -> Result<Evaluation, LlmError> {
        let prompt = build_evaluation_prompt(question, answer);
        let generation = self.generator.generate(&prompt, &self.model).await?;

        let (relevance, explanation) = match parse_verdict(&generation.text) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(
                    model = %self.model,
                    output_len = generation.text.len(),
                    reason = %reason,
                    "Could not parse evaluator output"
                );
                (
                    Relevance::Unknown,
                    format!("Failed to parse evaluation: {}", reason),
                )
            }
        };
        debug!(relevance = %relevance, "Evaluation complete");

        Ok(Evaluation {
            relevance,
            explanation,
            usage: generation.usage,
        })
    }
}

/// Parse a `{"Relevance": ..., "Explanation": ...}` verdict, tolerating code
/// fences and text around the JSON object.
pub fn parse_verdict(raw: &str) -> Result<(Relevance, String), String> {
    let body = strip_code_fence(raw.trim());
    let verdict: Verdict = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(first) => {
            let start = body.find('{');
            let end = body.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if s < e => {
                    serde_json::from_str(&body[s..=e]).map_err(|e| e.to_string())?
                }
                _ => return Err(first.to_string()),
            }
        }
    };
    let relevance = verdict.relevance.parse::<Relevance>()?;
    Ok((relevance, verdict.explanation))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop an optional language tag on the opening fence
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use std::sync::Arc;

    fn evaluator(mock: Arc<MockLlmProvider>) -> RelevanceEvaluator {
        RelevanceEvaluator::new(AnswerGenerator::new(mock), "gpt-4o-mini")
    }

    #[test]
    fn test_parse_plain_json() {
        let (relevance, explanation) =
            parse_verdict(r#"{"Relevance": "RELEVANT", "Explanation": "Directly answers."}"#)
                .unwrap();
        assert_eq!(relevance, Relevance::Relevant);
        assert_eq!(explanation, "Directly answers.");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"Relevance\": \"PARTLY_RELEVANT\", \"Explanation\": \"Misses timing.\"}\n```";
        let (relevance, _) = parse_verdict(raw).unwrap();
        assert_eq!(relevance, Relevance::PartlyRelevant);
    }

    #[test]
    fn test_parse_json_with_preamble() {
        let raw = "Here is my evaluation:\n{\"Relevance\": \"NON_RELEVANT\", \"Explanation\": \"Off topic.\"}";
        let (relevance, _) = parse_verdict(raw).unwrap();
        assert_eq!(relevance, Relevance::NonRelevant);
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        assert!(parse_verdict(r#"{"Relevance": "MAYBE", "Explanation": "?"}"#).is_err());
        assert!(parse_verdict("RELEVANT").is_err());
        assert!(parse_verdict("").is_err());
    }

    #[tokio::test]
    async fn test_evaluate_uses_fixed_model() {
        let mock = Arc::new(MockLlmProvider::with_responses([
            r#"{"Relevance": "RELEVANT", "Explanation": "Good."}"#,
        ]));
        let evaluation = evaluator(mock.clone())
            .evaluate("How do I bake bread?", "Knead, proof, bake.")
            .await
            .unwrap();
        assert_eq!(evaluation.relevance, Relevance::Relevant);
        assert_eq!(evaluation.explanation, "Good.");

        let request = &mock.requests()[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert!(request.messages[0].content.contains("Question: How do I bake bread?"));
        assert!(request.messages[0].content.contains("Generated Answer: Knead, proof, bake."));
    }

    #[tokio::test]
    async fn test_evaluate_malformed_output_is_unknown_with_usage() {
        let mock = Arc::new(MockLlmProvider::with_responses(["I think it's fine!"]));
        let evaluation = evaluator(mock).evaluate("q", "a").await.unwrap();
        assert_eq!(evaluation.relevance, Relevance::Unknown);
        assert!(evaluation.explanation.starts_with("Failed to parse evaluation"));
        assert_eq!(evaluation.usage, TokenUsage::new(100, 50));
    }

    #[tokio::test]
    async fn test_evaluate_propagates_call_failure() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::Timeout { timeout_secs: 120 });
        let err = evaluator(mock).evaluate("q", "a").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}
