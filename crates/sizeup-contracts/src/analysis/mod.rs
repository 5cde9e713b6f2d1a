mod context;
mod error;
mod instructions;
mod response;
mod result;
mod schema;

pub use context::{AnalysisContext, ContractVariant, EstimationMethod};
pub use error::AnalysisError;
pub use instructions::build_instruction;
pub use response::{validate_response, Accuracy, Estimate, FailureReason};
pub use result::AnalysisResult;
pub use schema::{
    FieldKind, ResponseSchema, SchemaField, FIELD_ACCURACY, FIELD_ANALYSIS_SUCCESS,
    FIELD_HEIGHT_CM, FIELD_REASON, FIELD_WEIGHT_KG,
};
