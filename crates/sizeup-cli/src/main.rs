use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use sizeup_contracts::analysis::{
    build_instruction, AnalysisContext, AnalysisError, AnalysisResult, ContractVariant,
    EstimationMethod, ResponseSchema,
};
use sizeup_contracts::events::EventWriter;
use sizeup_contracts::metrics::{categorize, compute_bmi, format_bmi};
use sizeup_engine::{AnalysisImage, Analyzer, OracleOptions};

#[derive(Debug, Parser)]
#[command(
    name = "sizeup",
    version,
    about = "Estimate height, weight and BMI from a single photo"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a photo to the oracle and print the result as JSON.
    Analyze(AnalyzeArgs),
    /// Compute BMI and category from known measurements.
    Bmi(BmiArgs),
    /// Print the response schema sent to a provider.
    Schema(SchemaArgs),
    /// Print the instruction the oracle would receive.
    Prompt(ContextArgs),
}

#[derive(Debug, Args)]
struct ContextArgs {
    /// Whether A4 or US Letter paper is visible in the photo.
    #[arg(long, value_parser = parse_yes_no)]
    reference: Option<bool>,
    /// How to estimate when no reference object is available.
    #[arg(long)]
    method: Option<EstimationMethod>,
    #[arg(long, default_value = "tiered")]
    variant: ContractVariant,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    /// Treat the image file as base64 text or a data URL.
    #[arg(long)]
    base64: bool,
    #[command(flatten)]
    context: ContextArgs,
    #[arg(long)]
    model: Option<String>,
    /// Transport timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,
    /// Append diagnostic events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct BmiArgs {
    #[arg(long)]
    height_cm: f64,
    #[arg(long)]
    weight_kg: f64,
}

#[derive(Debug, Parser)]
struct SchemaArgs {
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long, default_value = "tiered")]
    variant: ContractVariant,
}

const EXIT_DECLINED: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sizeup error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Bmi(args) => {
            print_json(&bmi_report(args.height_cm, args.weight_kg))?;
            Ok(0)
        }
        Command::Schema(args) => {
            print_json(&schema_for_provider(&args.provider, args.variant)?)?;
            Ok(0)
        }
        Command::Prompt(args) => {
            println!("{}", build_instruction(&args.to_context()));
            Ok(0)
        }
    }
}

impl ContextArgs {
    fn to_context(&self) -> AnalysisContext {
        AnalysisContext {
            has_reference_object: self.reference,
            estimation_method: self.method,
            variant: self.variant,
        }
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let image = load_image(&args)?;
    let mut options = Map::new();
    if let Some(timeout) = args.timeout {
        options.insert("request_timeout".to_string(), json!(timeout));
    }
    let mut analyzer =
        Analyzer::new(args.model.clone()).with_options(OracleOptions::from_map(&options));
    if let Some(path) = args.events.as_ref() {
        let session_id = uuid::Uuid::new_v4().to_string();
        analyzer = analyzer.with_events(EventWriter::new(path, session_id));
    }

    let plan = analyzer.plan()?;
    if let Some(reason) = plan.fallback_reason.as_deref() {
        eprintln!("sizeup: {reason} Using {} ({}).", plan.model, plan.provider);
    }

    match analyzer.analyze(&image, &args.context.to_context()) {
        Ok(result) => {
            print_json(&success_report(&result, &plan.provider, &plan.model)?)?;
            Ok(0)
        }
        Err(err) => {
            print_json(&error_report(&err))?;
            eprintln!("sizeup: {err}");
            Ok(exit_code_for(&err))
        }
    }
}

fn load_image(args: &AnalyzeArgs) -> Result<AnalysisImage> {
    let loaded = if args.base64 {
        let text = fs::read_to_string(&args.image)
            .with_context(|| format!("failed reading {}", args.image.display()))?;
        AnalysisImage::from_base64(&text)
    } else {
        let bytes = fs::read(&args.image)
            .with_context(|| format!("failed reading {}", args.image.display()))?;
        AnalysisImage::from_bytes(&bytes)
    };
    loaded.map_err(|err| {
        anyhow::anyhow!(
            "{err} ({})",
            err.detail().unwrap_or_else(|| err.code().to_string())
        )
    })
}

fn parse_yes_no(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        other => Err(format!("expected yes or no, got '{other}'")),
    }
}

fn schema_for_provider(provider: &str, variant: ContractVariant) -> Result<Value> {
    let schema = ResponseSchema::for_variant(variant);
    match provider.trim().to_ascii_lowercase().as_str() {
        "gemini" => Ok(schema.to_gemini_schema()),
        "openai" => Ok(schema.to_json_schema()),
        other => anyhow::bail!("unknown provider '{other}' (expected gemini or openai)"),
    }
}

fn bmi_report(height_cm: f64, weight_kg: f64) -> Value {
    let bmi = compute_bmi(height_cm, weight_kg);
    let info = categorize(bmi);
    json!({
        "heightCm": height_cm,
        "weightKg": weight_kg,
        "bmi": bmi,
        "bmiDisplay": format_bmi(bmi),
        "category": info.category,
        "color": info.color,
    })
}

fn success_report(result: &AnalysisResult, provider: &str, model: &str) -> Result<Value> {
    let mut report = serde_json::to_value(result)?;
    let object = report
        .as_object_mut()
        .context("analysis result did not serialize to an object")?;
    object.insert("bmiDisplay".to_string(), json!(format_bmi(result.bmi)));
    object.insert("provider".to_string(), json!(provider));
    object.insert("model".to_string(), json!(model));
    Ok(report)
}

fn error_report(err: &AnalysisError) -> Value {
    json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "oracleDecision": err.is_oracle_decision(),
            "retryable": err.is_retryable_by_caller(),
        }
    })
}

fn exit_code_for(err: &AnalysisError) -> i32 {
    if err.is_oracle_decision() {
        EXIT_DECLINED
    } else {
        1
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
