use indexmap::IndexMap;

pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_STRUCTURED_OUTPUT: &str = "structured_output";

/// An oracle model the analyzer knows how to reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    /// Usable as an estimation oracle: sees images and can be held to a
    /// response schema.
    pub fn is_oracle(&self) -> bool {
        self.supports(CAPABILITY_VISION) && self.supports(CAPABILITY_STRUCTURED_OUTPUT)
    }
}

/// Ordered model table. The first oracle-capable entry is the default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn oracles(&self) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.is_oracle())
            .cloned()
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let oracle = [CAPABILITY_VISION, CAPABILITY_STRUCTURED_OUTPUT];
    [
        ("gemini-2.5-flash", "gemini", &oracle[..]),
        ("gemini-2.5-pro", "gemini", &oracle[..]),
        ("gemini-2.0-flash", "gemini", &oracle[..]),
        ("gpt-4.1-mini", "openai", &oracle[..]),
        ("gpt-4o", "openai", &oracle[..]),
        ("dryrun-oracle-1", "dryrun", &oracle[..]),
        ("gpt-4.1-nano-text", "openai", &[CAPABILITY_STRUCTURED_OUTPUT][..]),
    ]
    .into_iter()
    .map(|(name, provider, capabilities)| {
        (
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.iter().map(|item| (*item).to_string()).collect(),
            },
        )
    })
    .collect()
}
