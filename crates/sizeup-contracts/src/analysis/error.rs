use thiserror::Error;

/// Every way a single analysis can end without a result.
///
/// `Display` renders the user-facing message. Structural and transport
/// variants also carry a `detail` for diagnostics that is never shown to the
/// user. None of these are retried internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("We couldn't find a person in this photo. Please use a photo with a clear view of one adult.")]
    NoPersonDetected,
    #[error("This tool is for adults only. Please use a photo of an adult.")]
    ChildDetected,
    #[error("The image is too blurry or unclear to analyze. Please try a sharper, well-lit photo.")]
    ImageUnclear,
    #[error("We couldn't find a reference object. Please include a sheet of A4 or US Letter paper in the photo.")]
    NoReferenceObject,
    #[error("We were unable to analyze this image. Please try a different photo.")]
    UnspecifiedAnalysisFailure { reason: Option<String> },
    #[error("The analysis returned invalid values. Please try again with a different photo.")]
    ImplausibleMetrics { height_cm: f64, weight_kg: f64 },
    #[error("The analysis service returned an invalid response. Please try again.")]
    InvalidResponseShape { detail: String },
    #[error("The analysis service returned an invalid response. Please try again.")]
    MalformedResponse { detail: String },
    #[error("Could not reach the analysis service. Please check your connection and try again.")]
    OracleUnavailable { detail: String },
    #[error("Please choose an estimation method when no reference object is available.")]
    InvalidContext { detail: String },
    #[error("This photo format is not supported. Please use a PNG, JPEG or WebP image.")]
    UnsupportedImage { detail: String },
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPersonDetected => "no_person_detected",
            Self::ChildDetected => "child_detected",
            Self::ImageUnclear => "image_unclear",
            Self::NoReferenceObject => "no_reference_object",
            Self::UnspecifiedAnalysisFailure { .. } => "analysis_failed",
            Self::ImplausibleMetrics { .. } => "implausible_metrics",
            Self::InvalidResponseShape { .. } => "invalid_response_shape",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::OracleUnavailable { .. } => "oracle_unavailable",
            Self::InvalidContext { .. } => "invalid_context",
            Self::UnsupportedImage { .. } => "unsupported_image",
        }
    }

    /// True when the oracle was reached and answered, but declined the photo
    /// or produced numbers that cannot be used.
    pub fn is_oracle_decision(&self) -> bool {
        matches!(
            self,
            Self::NoPersonDetected
                | Self::ChildDetected
                | Self::ImageUnclear
                | Self::NoReferenceObject
                | Self::UnspecifiedAnalysisFailure { .. }
                | Self::ImplausibleMetrics { .. }
        )
    }

    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            Self::OracleUnavailable { .. }
                | Self::MalformedResponse { .. }
                | Self::InvalidResponseShape { .. }
        )
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Self::UnspecifiedAnalysisFailure { reason } => reason
                .as_ref()
                .map(|reason| format!("unrecognized reason '{reason}'")),
            Self::ImplausibleMetrics {
                height_cm,
                weight_kg,
            } => Some(format!("heightCm={height_cm} weightKg={weight_kg}")),
            Self::InvalidResponseShape { detail }
            | Self::MalformedResponse { detail }
            | Self::OracleUnavailable { detail }
            | Self::InvalidContext { detail }
            | Self::UnsupportedImage { detail } => Some(detail.clone()),
            Self::NoPersonDetected
            | Self::ChildDetected
            | Self::ImageUnclear
            | Self::NoReferenceObject => None,
        }
    }
}
