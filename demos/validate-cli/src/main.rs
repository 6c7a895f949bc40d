//! Validates a tool source file against a security policy and prints the
//! verdict.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use dyntools::Runtime;
use dyntools::config::{ConfigLoader, PolicyPreset};
use dyntools::primitives::Language;
use dyntools::validation::{CacheMode, ValidationReport, ValidationRequest};
use tracing::debug;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Strict,
    Permissive,
}

impl From<PolicyArg> for PolicyPreset {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Strict => Self::Strict,
            PolicyArg::Permissive => Self::Permissive,
        }
    }
}

/// Validate agent-submitted tool code.
#[derive(Debug, Parser)]
#[command(name = "validate-cli", version)]
struct Args {
    /// Source file to validate.
    file: PathBuf,

    /// Source language; inferred from the file extension when omitted.
    #[arg(short, long)]
    language: Option<String>,

    /// Built-in policy, overriding the configuration.
    #[arg(short, long, value_enum)]
    policy: Option<PolicyArg>,

    /// TOML configuration file.
    #[arg(short, long, env = "DYNTOOLS_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the artifact cache.
    #[arg(long)]
    no_cache: bool,

    /// Print the full report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(policy) = args.policy {
        config.policy.preset = policy.into();
        config.policy.path = None;
    }
    dyntools::telemetry::init_tracing(&config.logging);

    let language = match &args.language {
        Some(language) => language.parse()?,
        None => infer_language(&args.file)?,
    };
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let runtime = Runtime::from_config(&config).await?;
    let mode = if args.no_cache {
        CacheMode::Bypass
    } else {
        CacheMode::ReadWrite
    };
    let request = ValidationRequest::new(language, source).with_cache_mode(mode);
    debug!(file = %args.file.display(), %language, "validating");
    let report = runtime.validation().validate_safe(&request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.is_accepted())
}

fn infer_language(path: &Path) -> Result<Language> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| anyhow!("cannot infer language of {}; pass --language", path.display()))?;
    Ok(extension.parse()?)
}

fn print_report(report: &ValidationReport) {
    let verdict = if report.is_accepted() {
        "ACCEPTED"
    } else {
        "REJECTED"
    };
    println!(
        "{verdict} under policy {} ({} {})",
        report.policy_id,
        report.result.language,
        report.content_hash()
    );
    if report.cache_hit {
        println!("  (cached result)");
    }
    if let Some(reason) = report.decision.reason() {
        println!(
            "  decision: {:?} ({}): {reason}",
            report.decision.kind(),
            report.decision.violated_rules().join(", ")
        );
    }
    for error in &report.result.errors {
        println!("  error: {error}");
    }
    for warning in &report.result.warnings {
        println!("  warning: {warning}");
    }
    for violation in &report.violations {
        println!(
            "  {} [{:?}] {}",
            violation.rule_id(),
            violation.severity(),
            violation.message()
        );
    }
    if let Some(estimate) = &report.result.estimate {
        println!(
            "  estimate: complexity {}, memory {} MB, cpu {:.2} s",
            estimate.complexity, estimate.memory_mb, estimate.cpu_seconds
        );
    }
}
