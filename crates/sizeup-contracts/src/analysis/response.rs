use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::ContractVariant;
use super::error::AnalysisError;
use super::schema::{
    FIELD_ACCURACY, FIELD_ANALYSIS_SUCCESS, FIELD_HEIGHT_CM, FIELD_REASON, FIELD_WEIGHT_KG,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    High,
    Medium,
    Low,
}

impl Accuracy {
    pub const ALL: [Accuracy; 3] = [Accuracy::High, Accuracy::Medium, Accuracy::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.as_str() == raw)
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoPersonDetected,
    ChildDetected,
    ImageUnclear,
    NoReferenceObject,
}

impl FailureReason {
    const TIERED: [FailureReason; 3] = [
        FailureReason::NoPersonDetected,
        FailureReason::ChildDetected,
        FailureReason::ImageUnclear,
    ];
    const REFERENCE_REQUIRED: [FailureReason; 4] = [
        FailureReason::NoPersonDetected,
        FailureReason::ChildDetected,
        FailureReason::ImageUnclear,
        FailureReason::NoReferenceObject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPersonDetected => "no_person_detected",
            Self::ChildDetected => "child_detected",
            Self::ImageUnclear => "image_unclear",
            Self::NoReferenceObject => "no_reference_object",
        }
    }

    pub fn declared_for(variant: ContractVariant) -> &'static [FailureReason] {
        match variant {
            ContractVariant::Tiered => &Self::TIERED,
            ContractVariant::ReferenceRequired => &Self::REFERENCE_REQUIRED,
        }
    }

    /// Only reasons declared for the variant count; anything else is an
    /// unspecified failure.
    pub fn parse(raw: &str, variant: ContractVariant) -> Option<Self> {
        Self::declared_for(variant)
            .iter()
            .copied()
            .find(|reason| reason.as_str() == raw)
    }

    fn into_error(self) -> AnalysisError {
        match self {
            Self::NoPersonDetected => AnalysisError::NoPersonDetected,
            Self::ChildDetected => AnalysisError::ChildDetected,
            Self::ImageUnclear => AnalysisError::ImageUnclear,
            Self::NoReferenceObject => AnalysisError::NoReferenceObject,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<Accuracy>,
}

// Order matters: parse, shape, declared refusal, plausibility.
pub fn validate_response(raw: &str, variant: ContractVariant) -> Result<Estimate, AnalysisError> {
    let parsed: Value = serde_json::from_str(raw.trim()).map_err(|err| {
        AnalysisError::MalformedResponse {
            detail: format!("oracle reply is not JSON: {err}"),
        }
    })?;
    let payload = match parsed {
        Value::Object(payload) => payload,
        other => {
            return Err(AnalysisError::MalformedResponse {
                detail: format!("oracle reply is not a JSON object: {}", kind_of(&other)),
            });
        }
    };

    let shape = check_shape(&payload, variant)?;

    if !shape.success {
        let reason = payload.get(FIELD_REASON).and_then(Value::as_str);
        return Err(match reason.and_then(|raw| FailureReason::parse(raw, variant)) {
            Some(known) => known.into_error(),
            None => AnalysisError::UnspecifiedAnalysisFailure {
                reason: reason.map(str::to_string),
            },
        });
    }

    if shape.height_cm <= 0.0 || shape.weight_kg <= 0.0 {
        return Err(AnalysisError::ImplausibleMetrics {
            height_cm: shape.height_cm,
            weight_kg: shape.weight_kg,
        });
    }

    Ok(Estimate {
        height_cm: shape.height_cm,
        weight_kg: shape.weight_kg,
        accuracy: shape.accuracy,
    })
}

struct CheckedShape {
    success: bool,
    height_cm: f64,
    weight_kg: f64,
    accuracy: Option<Accuracy>,
}

fn check_shape(
    payload: &Map<String, Value>,
    variant: ContractVariant,
) -> Result<CheckedShape, AnalysisError> {
    let success = match payload.get(FIELD_ANALYSIS_SUCCESS) {
        Some(Value::Bool(value)) => *value,
        other => return Err(shape_error(FIELD_ANALYSIS_SUCCESS, "boolean", other)),
    };
    let height_cm = number_field(payload, FIELD_HEIGHT_CM)?;
    let weight_kg = number_field(payload, FIELD_WEIGHT_KG)?;

    let accuracy = if success && variant.reports_accuracy() {
        match payload.get(FIELD_ACCURACY) {
            Some(Value::String(raw)) => Some(Accuracy::parse(raw).ok_or_else(|| {
                AnalysisError::InvalidResponseShape {
                    detail: format!("{FIELD_ACCURACY} has unknown tier '{raw}'"),
                }
            })?),
            other => return Err(shape_error(FIELD_ACCURACY, "string", other)),
        }
    } else {
        None
    };

    Ok(CheckedShape {
        success,
        height_cm,
        weight_kg,
        accuracy,
    })
}

fn number_field(payload: &Map<String, Value>, name: &str) -> Result<f64, AnalysisError> {
    match payload.get(name) {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| shape_error(name, "number", payload.get(name))),
        other => Err(shape_error(name, "number", other)),
    }
}

fn shape_error(field: &str, expected: &str, found: Option<&Value>) -> AnalysisError {
    let found = found.map(kind_of).unwrap_or("missing");
    AnalysisError::InvalidResponseShape {
        detail: format!("{field}: expected {expected}, found {found}"),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_response, Accuracy, Estimate};
    use crate::analysis::{AnalysisError, ContractVariant};

    const TIERED: ContractVariant = ContractVariant::Tiered;
    const LEGACY: ContractVariant = ContractVariant::ReferenceRequired;

    #[test]
    fn success_passes_values_through_unmodified() {
        let estimate = validate_response(
            r#"{"analysisSuccess": true, "heightCm": 175.5, "weightKg": 72.3, "accuracy": "high"}"#,
            TIERED,
        );
        assert_eq!(
            estimate,
            Ok(Estimate {
                height_cm: 175.5,
                weight_kg: 72.3,
                accuracy: Some(Accuracy::High),
            })
        );
    }

    #[test]
    fn refusal_maps_reason_regardless_of_numbers() {
        for body in [
            r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": "no_person_detected"}"#,
            r#"{"analysisSuccess": false, "heightCm": 180, "weightKg": 80, "reason": "no_person_detected"}"#,
        ] {
            assert_eq!(
                validate_response(body, TIERED),
                Err(AnalysisError::NoPersonDetected)
            );
        }
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": "child_detected"}"#,
                TIERED
            ),
            Err(AnalysisError::ChildDetected)
        );
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": "image_unclear"}"#,
                LEGACY
            ),
            Err(AnalysisError::ImageUnclear)
        );
    }

    #[test]
    fn reference_reason_is_only_honored_by_legacy_contract() {
        let body = r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": "no_reference_object"}"#;
        assert_eq!(
            validate_response(body, LEGACY),
            Err(AnalysisError::NoReferenceObject)
        );
        assert_eq!(
            validate_response(body, TIERED),
            Err(AnalysisError::UnspecifiedAnalysisFailure {
                reason: Some("no_reference_object".to_string())
            })
        );
    }

    #[test]
    fn unknown_or_missing_reason_is_unspecified() {
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0}"#,
                TIERED
            ),
            Err(AnalysisError::UnspecifiedAnalysisFailure { reason: None })
        );
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": "sunglasses"}"#,
                TIERED
            ),
            Err(AnalysisError::UnspecifiedAnalysisFailure {
                reason: Some("sunglasses".to_string())
            })
        );
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": false, "heightCm": 0, "weightKg": 0, "reason": 7}"#,
                TIERED
            ),
            Err(AnalysisError::UnspecifiedAnalysisFailure { reason: None })
        );
    }

    #[test]
    fn claimed_success_with_zero_height_is_implausible() {
        assert_eq!(
            validate_response(
                r#"{"analysisSuccess": true, "heightCm": 0, "weightKg": 50, "accuracy": "low"}"#,
                TIERED
            ),
            Err(AnalysisError::ImplausibleMetrics {
                height_cm: 0.0,
                weight_kg: 50.0
            })
        );
        assert!(matches!(
            validate_response(
                r#"{"analysisSuccess": true, "heightCm": 170, "weightKg": -2}"#,
                LEGACY
            ),
            Err(AnalysisError::ImplausibleMetrics { .. })
        ));
    }

    #[test]
    fn missing_or_mistyped_fields_are_shape_errors() {
        let cases = [
            r#"{"analysisSuccess": true, "weightKg": 70, "accuracy": "low"}"#,
            r#"{"analysisSuccess": true, "heightCm": "175", "weightKg": 70, "accuracy": "low"}"#,
            r#"{"analysisSuccess": "true", "heightCm": 175, "weightKg": 70, "accuracy": "low"}"#,
            r#"{"analysisSuccess": true, "heightCm": 175, "weightKg": null, "accuracy": "low"}"#,
            r#"{"analysisSuccess": true, "heightCm": 175, "weightKg": 70}"#,
            r#"{"analysisSuccess": true, "heightCm": 175, "weightKg": 70, "accuracy": 1}"#,
            r#"{"analysisSuccess": true, "heightCm": 175, "weightKg": 70, "accuracy": "exact"}"#,
        ];
        for body in cases {
            assert!(
                matches!(
                    validate_response(body, TIERED),
                    Err(AnalysisError::InvalidResponseShape { .. })
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn shape_is_checked_before_refusal_and_plausibility() {
        assert!(matches!(
            validate_response(
                r#"{"analysisSuccess": false, "reason": "child_detected"}"#,
                TIERED
            ),
            Err(AnalysisError::InvalidResponseShape { .. })
        ));
        assert!(matches!(
            validate_response(r#"{"analysisSuccess": true, "heightCm": 0, "weightKg": 0}"#, TIERED),
            Err(AnalysisError::InvalidResponseShape { .. })
        ));
    }

    #[test]
    fn unparseable_or_non_object_bodies_are_malformed() {
        for body in ["", "not json", "{\"analysisSuccess\": tru", "[1, 2]", "42"] {
            assert!(
                matches!(
                    validate_response(body, TIERED),
                    Err(AnalysisError::MalformedResponse { .. })
                ),
                "{body:?}"
            );
        }
    }

    #[test]
    fn low_accuracy_without_reference_is_still_success() {
        let estimate = validate_response(
            r#"{"analysisSuccess": true, "heightCm": 168, "weightKg": 61.5, "accuracy": "low"}"#,
            TIERED,
        );
        assert_eq!(
            estimate.map(|value| value.accuracy),
            Ok(Some(Accuracy::Low))
        );
    }

    #[test]
    fn legacy_contract_ignores_accuracy() {
        let estimate = validate_response(
            r#"{"analysisSuccess": true, "heightCm": 181, "weightKg": 77, "accuracy": "bogus"}"#,
            LEGACY,
        );
        assert_eq!(
            estimate,
            Ok(Estimate {
                height_cm: 181.0,
                weight_kg: 77.0,
                accuracy: None,
            })
        );
    }
}
