use serde::Serialize;

use super::response::{Accuracy, Estimate};
use crate::metrics::{categorize, compute_bmi, BmiCategory};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<Accuracy>,
    pub bmi: f64,
    pub category: BmiCategory,
    pub color: &'static str,
}

impl AnalysisResult {
    pub fn from_estimate(estimate: Estimate) -> Self {
        let bmi = compute_bmi(estimate.height_cm, estimate.weight_kg);
        let info = categorize(bmi);
        Self {
            height_cm: estimate.height_cm,
            weight_kg: estimate.weight_kg,
            accuracy: estimate.accuracy,
            bmi,
            category: info.category,
            color: info.color,
        }
    }
}

impl From<Estimate> for AnalysisResult {
    fn from(estimate: Estimate) -> Self {
        Self::from_estimate(estimate)
    }
}
