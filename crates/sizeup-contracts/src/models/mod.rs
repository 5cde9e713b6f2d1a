mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, CAPABILITY_STRUCTURED_OUTPUT, CAPABILITY_VISION};
pub use selectors::{ModelSelection, ModelSelector, SelectionError};
