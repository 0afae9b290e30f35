//! Usage cost accounting.
//!
//! Converts token usage into a USD estimate from a per-model price table.
//! A model missing from the table yields `None`, never a zero cost.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::PricingConfig;
use crate::types::TokenUsage;

/// Prices for one model, in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_rate: f64,
    pub output_rate: f64,
}

/// Static mapping from model identifier to price.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPrice>,
}

impl PricingTable {
    pub fn new(models: BTreeMap<String, ModelPrice>) -> Self {
        Self { models }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(config.models.clone())
    }

    /// Add or replace a model's price.
    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.models.insert(model.into(), price);
    }

    pub fn price(&self, model: &str) -> Option<&ModelPrice> {
        self.models.get(model)
    }

    /// Compute the cost of one call.
    ///
    /// Returns `None` when `model` has no entry in the table.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> Option<f64> {
        let Some(price) = self.models.get(model) else {
            warn!(model = %model, "No price configured for model; cost not computed");
            return None;
        };
        Some(
            usage.prompt_tokens as f64 * price.input_rate / 1_000_000.0
                + usage.completion_tokens as f64 * price.output_rate / 1_000_000.0,
        )
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Sum component costs; absent if any component is absent.
pub fn total_cost(components: &[Option<f64>]) -> Option<f64> {
    components.iter().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PricingTable {
        PricingTable::from_config(&PricingConfig::default())
    }

    #[test]
    fn test_known_model_cost() {
        let usage = TokenUsage::new(1_000_000, 1_000_000);
        let cost = table().cost("gpt-4o-mini", &usage).unwrap();
        assert!((cost - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_known_model_positive_cost() {
        let usage = TokenUsage::new(812, 143);
        let cost = table().cost("gpt-4o", &usage).unwrap();
        let expected = 812.0 * 2.5 / 1e6 + 143.0 * 10.0 / 1e6;
        assert!(cost > 0.0);
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_is_absent_not_zero() {
        let usage = TokenUsage::new(500, 200);
        assert_eq!(table().cost("llama-from-the-basement", &usage), None);
    }

    #[test]
    fn test_zero_usage_costs_zero() {
        let cost = table().cost("gpt-4o-mini", &TokenUsage::default()).unwrap();
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_insert_extends_table() {
        let mut t = table();
        let before = t.len();
        t.insert(
            "house-model",
            ModelPrice {
                input_rate: 1.0,
                output_rate: 2.0,
            },
        );
        assert_eq!(t.len(), before + 1);
        let cost = t.cost("house-model", &TokenUsage::new(1_000, 1_000)).unwrap();
        assert!((cost - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_total_cost_requires_every_component() {
        assert_eq!(total_cost(&[Some(0.1), Some(0.2)]).map(|c| (c * 10.0).round()), Some(3.0));
        assert_eq!(total_cost(&[Some(0.1), None]), None);
        assert_eq!(total_cost(&[None, None]), None);
    }
}
