//! # Recipe RAG Core
//!
//! Core library for the recipe assistant.
//! Provides the document indexer, hybrid retriever, prompt composer, answer
//! generator, relevance evaluator, cost accountant and the pipeline that
//! sequences them, plus the vector store and LLM clients they run on.

pub mod brain;
pub mod config;
pub mod conversations;
pub mod cost;
pub mod embeddings;
pub mod error;
pub mod evaluator;
pub mod fusion;
pub mod gateway;
pub mod generator;
pub mod indexer;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod recipe;
pub mod retriever;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{RagConfig, load_config};
pub use conversations::{Conversation, ConversationLog, Feedback};
pub use cost::{ModelPrice, PricingTable};
pub use error::{RagError, Result};
pub use evaluator::{Evaluation, RelevanceEvaluator};
pub use generator::{AnswerGenerator, Generation};
pub use indexer::{DocumentIndexer, IndexStats};
pub use pipeline::{RagPipeline, Services};
pub use prompt::build_prompt;
pub use recipe::{RecipeDocument, prepare_documents};
pub use retriever::HybridRetriever;
pub use store::{InMemoryStore, QdrantStore, VectorStore};
pub use types::{AnswerRecord, CompletionRequest, CompletionResponse, Relevance, TokenUsage};
