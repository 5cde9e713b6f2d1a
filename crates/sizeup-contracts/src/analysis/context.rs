use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    Pose,
    Environment,
}

impl EstimationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimationMethod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pose" => Ok(Self::Pose),
            "environment" | "env" => Ok(Self::Environment),
            other => Err(format!("unknown estimation method '{other}'")),
        }
    }
}

/// Which revision of the oracle contract a request is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractVariant {
    /// Reference object optional; the oracle reports an accuracy tier.
    #[default]
    Tiered,
    /// Legacy contract: the oracle refuses photos without a reference object
    /// and reports no accuracy tier.
    ReferenceRequired,
}

impl ContractVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiered => "tiered",
            Self::ReferenceRequired => "reference_required",
        }
    }

    pub fn reports_accuracy(self) -> bool {
        matches!(self, Self::Tiered)
    }
}

impl FromStr for ContractVariant {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tiered" => Ok(Self::Tiered),
            "reference_required" | "legacy" => Ok(Self::ReferenceRequired),
            other => Err(format!("unknown contract variant '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub has_reference_object: Option<bool>,
    pub estimation_method: Option<EstimationMethod>,
    #[serde(default)]
    pub variant: ContractVariant,
}

impl AnalysisContext {
    pub fn with_reference() -> Self {
        Self {
            has_reference_object: Some(true),
            ..Self::default()
        }
    }

    pub fn without_reference(method: EstimationMethod) -> Self {
        Self {
            has_reference_object: Some(false),
            estimation_method: Some(method),
            ..Self::default()
        }
    }

    pub fn legacy() -> Self {
        Self {
            variant: ContractVariant::ReferenceRequired,
            ..Self::default()
        }
    }

    /// A tiered request that declares no reference object must say how the
    /// estimate should be made instead.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.variant == ContractVariant::Tiered
            && self.has_reference_object == Some(false)
            && self.estimation_method.is_none()
        {
            return Err(AnalysisError::InvalidContext {
                detail: "has_reference_object=false requires an estimation_method".to_string(),
            });
        }
        Ok(())
    }
}
