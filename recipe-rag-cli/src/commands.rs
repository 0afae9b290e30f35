//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use recipe_rag_core::config::{RagConfig, load_config, load_config_file};
use recipe_rag_core::conversations::create_conversation_log;
use recipe_rag_core::gateway::{self, AppState};
use recipe_rag_core::{AnswerRecord, IndexStats, RecipeDocument, Services};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_path),
        Commands::Index { data } => {
            let config = resolve_config(workspace, config_path)?;
            let path = data.unwrap_or_else(|| config.data.recipes_path.clone());
            let services = Services::from_config(&config)?;
            let stats = run_index(&services, &config, &path).await?;
            println!("{}", format_stats(&stats, &config.store.collection));
            Ok(())
        }
        Commands::Search { query, limit } => {
            let config = resolve_config(workspace, config_path)?;
            let services = Services::from_config(&config)?;
            let pipeline = services.pipeline(&config);
            let limit = pipeline.check_limit(limit)?;
            let results = pipeline.retriever().search(&query, limit).await?;
            if results.is_empty() {
                println!("No recipes found.");
            }
            for (rank, doc) in results.iter().enumerate() {
                println!("{}", format_document(rank + 1, doc));
            }
            Ok(())
        }
        Commands::Ask {
            question,
            model,
            limit,
            json,
        } => {
            let config = resolve_config(workspace, config_path)?;
            let services = Services::from_config(&config)?;
            let pipeline = services.pipeline(&config);
            let record = pipeline.answer(&question, model.as_deref(), limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", format_record(&record));
            }
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            skip_index,
        } => {
            let mut config = resolve_config(workspace, config_path)?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            for warning in config.validate() {
                warn!("{}", warning);
            }

            let services = Services::from_config(&config)?;
            if skip_index {
                info!("Skipping startup indexing");
            } else {
                let stats = run_index(&services, &config, &config.data.recipes_path).await?;
                info!(
                    indexed = stats.indexed,
                    skipped = stats.skipped,
                    "Startup indexing complete"
                );
            }

            let conversations = create_conversation_log(&config.conversations)?;
            let state = AppState::new(Arc::new(services.pipeline(&config)), conversations);
            println!("Serving on http://{}", config.gateway.addr());
            gateway::run(state, &config.gateway).await?;
            Ok(())
        }
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let target = workspace.join(".recipe-rag").join("config.toml");
            if target.exists() {
                println!("Config already exists at {}", target.display());
                return Ok(());
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&RagConfig::default())?;
            std::fs::write(&target, toml_str)?;
            println!("Created {}", target.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = resolve_config(workspace, config_path)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            for warning in config.validate() {
                println!("# warning: {}", warning);
            }
            Ok(())
        }
    }
}

/// Load config from `--config` when given, otherwise from the layered sources,
/// then anchor relative data paths at the workspace.
fn resolve_config(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<RagConfig> {
    let mut config = match config_path {
        Some(path) => load_config_file(path),
        None => load_config(Some(workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    config.data.recipes_path = anchor(workspace, &config.data.recipes_path);
    config.conversations.db_path = anchor(workspace, &config.conversations.db_path);
    Ok(config)
}

fn anchor(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

async fn run_index(
    services: &Services,
    config: &RagConfig,
    path: &Path,
) -> anyhow::Result<IndexStats> {
    let indexer = services.indexer(config);
    let stats = indexer
        .index_source(&config.store.collection, path)
        .await
        .map_err(|e| anyhow::anyhow!("Indexing {} failed: {}", path.display(), e))?;
    Ok(stats)
}

fn format_stats(stats: &IndexStats, collection: &str) -> String {
    let mut out = format!(
        "Indexed {} recipes into '{}' ({} skipped)",
        stats.indexed, collection, stats.skipped
    );
    if stats.created_collection {
        out.push_str("; collection created");
    }
    out
}

fn format_document(rank: usize, doc: &RecipeDocument) -> String {
    format!(
        "{}. {} [id {}] rating {}, ready in {}\n   {}",
        rank, doc.name, doc.id, doc.ratings, doc.ready_in, doc.description
    )
}

fn format_record(record: &AnswerRecord) -> String {
    let cost = match record.cost {
        Some(c) => format!("${:.6}", c),
        None => "unknown".to_string(),
    };
    format!(
        "{}\n\n---\nmodel: {}\nrelevance: {} ({})\ntokens: {} answer, {} evaluation\ntime: {:.2}s\ncost: {}",
        record.answer,
        record.model_used,
        record.relevance,
        record.relevance_explanation,
        record.answer_usage.total_tokens,
        record.eval_usage.total_tokens,
        record.response_time,
        cost
    )
}
