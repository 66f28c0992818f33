use anyhow::Context;
use api_shared::{CheckInteractionsReq, ComprehensiveAnalysisReq, DrugInput, PatientProfile};
use clap::{Parser, Subcommand};
use rx_types::Route;
use rxcheck_core::{resolve_reference_dir, CoreConfig, DrugSafetyService};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rxcheck")]
#[command(about = "Drug interaction checks against local reference data")]
struct Cli {
    /// Reference data directory (defaults to $RXCHECK_REFERENCE_DIR or the bundled data)
    #[arg(long, global = true)]
    reference_dir: Option<PathBuf>,

    /// Maximum edit distance for fuzzy drug name matching
    #[arg(long, global = true, default_value_t = rxcheck_core::constants::DEFAULT_FUZZY_MAX_DISTANCE)]
    fuzzy_max_distance: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract drug mentions from free text
    Extract {
        /// Clinical text, e.g. "Aspirin 325mg twice daily"
        text: String,
    },
    /// Resolve a drug name against the catalog
    Resolve {
        /// Drug name as written
        name: String,
    },
    /// Check interactions between drugs
    Check {
        /// Drugs as NAME[:DOSAGE[:FREQUENCY[:ROUTE]]], e.g. "Warfarin:5mg:once daily"
        #[arg(required = true)]
        drugs: Vec<String>,
        /// Patient condition (repeatable)
        #[arg(long = "condition")]
        conditions: Vec<String>,
        /// Patient allergy (repeatable)
        #[arg(long = "allergy")]
        allergies: Vec<String>,
        /// Patient age in years; patient checks need either this or a condition/allergy
        #[arg(long, allow_hyphen_values = true)]
        age: Option<i64>,
        /// Patient weight in kg
        #[arg(long, allow_hyphen_values = true)]
        weight: Option<f64>,
    },
    /// Full analysis: interactions, dosage warnings and alternatives
    Analyze {
        /// Drugs as NAME[:DOSAGE[:FREQUENCY[:ROUTE]]]
        #[arg(required = true)]
        drugs: Vec<String>,
        /// Patient age in years
        #[arg(long, allow_hyphen_values = true)]
        age: i64,
        /// Patient weight in kg (0 when not recorded)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        weight: f64,
        /// Patient condition (repeatable)
        #[arg(long = "condition")]
        conditions: Vec<String>,
        /// Patient allergy (repeatable)
        #[arg(long = "allergy")]
        allergies: Vec<String>,
    },
    /// Load and validate the reference data, then print its summary
    Validate,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("rxcheck=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let override_dir = cli.reference_dir.or_else(|| {
        std::env::var("RXCHECK_REFERENCE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    });
    let reference_dir = resolve_reference_dir(override_dir)?;
    let cfg = CoreConfig::new(
        reference_dir,
        cli.fuzzy_max_distance,
        rxcheck_core::constants::DEFAULT_MAX_DRUGS_PER_REQUEST,
    )?;
    let service = DrugSafetyService::new(Arc::new(cfg)).context("failed to load reference data")?;

    match cli.command {
        Commands::Extract { text } => print_json(&service.extract_drugs(&text)),
        Commands::Resolve { name } => print_json(&service.resolve(&name)),
        Commands::Check {
            drugs,
            conditions,
            allergies,
            age,
            weight,
        } => {
            let patient = (age.is_some() || !conditions.is_empty() || !allergies.is_empty()).then(
                || PatientProfile {
                    age: age.unwrap_or(0),
                    weight_kg: weight.unwrap_or(0.0),
                    conditions,
                    allergies,
                },
            );
            let req = CheckInteractionsReq {
                drugs: parse_drugs(&drugs)?,
                patient,
            };
            print_json(&service.check_interactions(&req)?)
        }
        Commands::Analyze {
            drugs,
            age,
            weight,
            conditions,
            allergies,
        } => {
            let req = ComprehensiveAnalysisReq {
                drugs: parse_drugs(&drugs)?,
                patient: PatientProfile {
                    age,
                    weight_kg: weight,
                    conditions,
                    allergies,
                },
            };
            print_json(&service.comprehensive_analysis(&req)?)
        }
        Commands::Validate => print_json(&service.reference_info()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_drugs(args: &[String]) -> anyhow::Result<Vec<DrugInput>> {
    args.iter().map(|a| parse_drug(a)).collect()
}

/// Parse `NAME[:DOSAGE[:FREQUENCY[:ROUTE]]]`. Empty fields are treated as absent.
fn parse_drug(arg: &str) -> anyhow::Result<DrugInput> {
    let mut parts = arg.split(':').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        anyhow::bail!("drug '{arg}' has no name");
    }

    let mut field = || {
        parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let dosage = field();
    let frequency = field();
    let route = field().map(|r| Route::parse(&r)).unwrap_or_default();
    if let Some(extra) = field() {
        anyhow::bail!("drug '{arg}' has an unexpected field '{extra}'");
    }

    Ok(DrugInput {
        name: name.to_owned(),
        dosage,
        frequency,
        route,
        drug_id: None,
    })
}
