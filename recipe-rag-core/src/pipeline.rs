//! Pipeline orchestrator.
//!
//! retrieval -> prompt -> generation -> evaluation -> cost, sequentially.
//! Any stage failure aborts the run; there is no partial record.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::brain::LlmProvider;
use crate::config::RagConfig;
use crate::cost::{PricingTable, total_cost};
use crate::embeddings::{DenseEmbedder, SparseEncoder, create_dense_embedder};
use crate::error::{Result, ValidationError};
use crate::evaluator::RelevanceEvaluator;
use crate::generator::AnswerGenerator;
use crate::indexer::DocumentIndexer;
use crate::prompt::build_prompt;
use crate::providers::create_provider;
use crate::retriever::HybridRetriever;
use crate::store::{VectorStore, create_store};
use crate::types::AnswerRecord;

/// Answers recipe questions from the indexed collection.
pub struct RagPipeline {
    retriever: HybridRetriever,
    generator: AnswerGenerator,
    evaluator: RelevanceEvaluator,
    pricing: PricingTable,
    default_model: String,
    default_limit: usize,
    max_limit: usize,
}

impl RagPipeline {
    pub fn new(
        retriever: HybridRetriever,
        generator: AnswerGenerator,
        evaluator: RelevanceEvaluator,
        pricing: PricingTable,
        default_model: impl Into<String>,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            evaluator,
            pricing,
            default_model: default_model.into(),
            default_limit,
            max_limit,
        }
    }

    /// Wire the pipeline from config around injected clients.
    pub fn from_parts(
        config: &RagConfig,
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let retriever = HybridRetriever::new(
            store,
            dense,
            SparseEncoder::from_config(&config.embedding),
            &config.store,
            &config.retrieval,
        );
        let generator = AnswerGenerator::new(provider);
        let evaluator = RelevanceEvaluator::new(generator.clone(), config.evaluator.model.clone());
        Self::new(
            retriever,
            generator,
            evaluator,
            PricingTable::from_config(&config.pricing),
            config.llm.default_model.clone(),
            config.retrieval.limit,
            config.retrieval.max_limit,
        )
    }

    /// Answer `question`. `model` and `limit` fall back to configured defaults.
    ///
    /// An explicit `limit` must lie in `1..=max_limit`.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer(
        &self,
        question: &str,
        model: Option<&str>,
        limit: Option<usize>,
    ) -> Result<AnswerRecord> {
        if question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        let limit = self.check_limit(limit)?;
        let model = model.unwrap_or(self.default_model.as_str());

        let start = Instant::now();
        let results = self.retriever.search(question, limit).await?;
        let prompt = build_prompt(question, &results);
        let generation = self.generator.generate(&prompt, model).await?;
        let evaluation = self.evaluator.evaluate(question, &generation.text).await?;
        let response_time = start.elapsed().as_secs_f64();

        let answer_cost = self.pricing.cost(model, &generation.usage);
        let eval_cost = self.pricing.cost(self.evaluator.model(), &evaluation.usage);
        let cost = total_cost(&[answer_cost, eval_cost]);

        info!(
            model,
            retrieved = results.len(),
            relevance = %evaluation.relevance,
            response_time,
            cost = ?cost,
            "Answered question"
        );

        Ok(AnswerRecord {
            answer: generation.text,
            model_used: model.to_string(),
            response_time,
            relevance: evaluation.relevance,
            relevance_explanation: evaluation.explanation,
            answer_usage: generation.usage,
            eval_usage: evaluation.usage,
            cost,
            created_at: Utc::now(),
        })
    }

    /// Resolve the requested limit against the default and the allowed range.
    pub fn check_limit(&self, limit: Option<usize>) -> std::result::Result<usize, ValidationError> {
        match limit {
            None => Ok(self.default_limit),
            Some(l) if l == 0 || l > self.max_limit => Err(ValidationError::InvalidLimit {
                limit: l,
                max: self.max_limit,
            }),
            Some(l) => Ok(l),
        }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Clients built from config, shared by the pipeline and the indexer.
pub struct Services {
    pub store: Arc<dyn VectorStore>,
    pub dense: Arc<dyn DenseEmbedder>,
    pub provider: Arc<dyn LlmProvider>,
}

impl Services {
    /// Construct the store, embedder and LLM provider named in `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Ok(Self {
            store: create_store(&config.store)?,
            dense: create_dense_embedder(&config.embedding, config.store.dense_dimensions)?,
            provider: create_provider(&config.llm)?,
        })
    }

    pub fn indexer(&self, config: &RagConfig) -> DocumentIndexer {
        DocumentIndexer::from_config(
            self.store.clone(),
            self.dense.clone(),
            &config.store,
            &config.embedding,
        )
    }

    pub fn pipeline(&self, config: &RagConfig) -> RagPipeline {
        RagPipeline::from_parts(
            config,
            self.store.clone(),
            self.dense.clone(),
            self.provider.clone(),
        )
    }
}
