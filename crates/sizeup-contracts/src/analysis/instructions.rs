use super::context::{AnalysisContext, ContractVariant, EstimationMethod};

const ROLE: &str = "You are an expert at estimating a person's height and weight from a single photograph. \
Analyze the attached image and respond only with JSON matching the provided schema.";

const REFERENCE_OBJECTS: &str = "Reference objects of known size: A4 paper is 210 x 297 mm, \
US Letter paper is 216 x 279 mm.";

const ENVIRONMENTAL_CUES: &str = "Environmental cues of typical size: a standard interior door is about 203 cm tall, \
a light switch is mounted about 122 cm from the floor, a chair seat is about 45 cm high, \
a kitchen countertop is about 91 cm high.";

const FAILURE_POLICY: &str = "Set analysisSuccess to false ONLY in one of these three cases:\n\
- no person is visible in the image (reason \"no_person_detected\")\n\
- the person appears to be a child (reason \"child_detected\")\n\
- the image is too blurry, dark or obstructed to judge the person's body (reason \"image_unclear\")\n\
The absence of a reference object is NOT a reason to fail. Without one, fall back to environmental cues, \
and without those to body proportions, and lower the accuracy tier instead.";

const LEGACY_FAILURE_POLICY: &str = "Set analysisSuccess to false in one of these cases:\n\
- no person is visible in the image (reason \"no_person_detected\")\n\
- the person appears to be a child (reason \"child_detected\")\n\
- the image is too blurry, dark or obstructed to judge the person's body (reason \"image_unclear\")\n\
- no sheet of A4 or US Letter paper is visible to set the scale (reason \"no_reference_object\")";

const OUTPUT_RULES: &str = "When analysisSuccess is false, set heightCm and weightKg to 0. \
When it is true, heightCm and weightKg must be positive numbers in centimeters and kilograms.";

pub fn build_instruction(context: &AnalysisContext) -> String {
    let sections = match context.variant {
        ContractVariant::Tiered => tiered_sections(context),
        ContractVariant::ReferenceRequired => legacy_sections(),
    };
    sections.join("\n\n")
}

fn tiered_sections(context: &AnalysisContext) -> Vec<String> {
    let mut sections = vec![ROLE.to_string()];
    sections.push(scale_guidance(context));
    sections.push(ACCURACY_HIERARCHY.to_string());
    sections.push(FAILURE_POLICY.to_string());
    sections.push(OUTPUT_RULES.to_string());
    sections
}

const ACCURACY_HIERARCHY: &str = "Report accuracy as follows:\n\
- \"high\": a reference object (A4 or US Letter paper) was used to set the scale\n\
- \"medium\": environmental cues were used to set the scale\n\
- \"low\": neither was usable and the estimate rests on body proportions alone";

fn scale_guidance(context: &AnalysisContext) -> String {
    match (context.has_reference_object, context.estimation_method) {
        (Some(true), _) => format!(
            "The user says a reference object is in the photo. {REFERENCE_OBJECTS} \
Locate it and use it to set the scale; this yields accuracy \"high\". \
If you cannot find it after all, use environmental cues instead. {ENVIRONMENTAL_CUES}"
        ),
        (Some(false), Some(EstimationMethod::Pose)) | (None, Some(EstimationMethod::Pose)) => {
            format!(
                "The user has no reference object and chose a pose-based estimate. \
Estimate primarily from the full-body pose and body proportions (an adult is typically 7 to 8 head heights tall). \
Cross-check against environmental cues where visible: if they confirm the scale report \"medium\", \
otherwise report \"low\". {ENVIRONMENTAL_CUES}"
            )
        }
        (Some(false), Some(EstimationMethod::Environment))
        | (None, Some(EstimationMethod::Environment)) => format!(
            "The user has no reference object and chose an environment-based estimate. \
{ENVIRONMENTAL_CUES} Use these cues to set the scale; this yields accuracy \"medium\". \
If no cue is usable, fall back to body proportions and report \"low\"."
        ),
        (Some(false), None) => format!(
            "The user has no reference object. {ENVIRONMENTAL_CUES} \
Use these cues to set the scale for accuracy \"medium\"; if none is usable, \
fall back to body proportions and report \"low\"."
        ),
        (None, None) => format!(
            "Check whether a reference object is in the photo. {REFERENCE_OBJECTS} \
If one is visible, use it to set the scale. Otherwise use environmental cues. {ENVIRONMENTAL_CUES}"
        ),
    }
}

fn legacy_sections() -> Vec<String> {
    vec![
        ROLE.to_string(),
        format!(
            "A reference object must be visible to set the scale. {REFERENCE_OBJECTS} \
Use it to measure the person's height, then estimate weight from body build."
        ),
        LEGACY_FAILURE_POLICY.to_string(),
        OUTPUT_RULES.to_string(),
    ]
}
