use thiserror::Error;

use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no oracle-capable models are registered")]
    NoOracleModels,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves the requested oracle model, falling back to the registry
    /// default with an explanation when it is unknown or cannot act as an
    /// oracle.
    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, SelectionError> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(name) => match self.registry.get(name) {
                Some(model) if model.is_oracle() => {
                    return Ok(ModelSelection {
                        model: model.clone(),
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                Some(_) => format!("Model '{name}' cannot analyze images with a response schema."),
                None => format!("Model '{name}' is not registered."),
            },
            None => "No model specified; using default.".to_string(),
        };

        let Some(model) = self.registry.oracles().into_iter().next() else {
            return Err(SelectionError::NoOracleModels);
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
