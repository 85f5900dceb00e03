//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{AppConfig, KubeEvent, KubeObject};
use dispatcher::{ExcludeFilters, SinkRegistry};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    sinks: Vec<String>,
    exclude_filters: usize,
    description_filters: usize,
    descriptions: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return invalid(config_path, vec![format!("File not found: {}", args.config.display())]);
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(app) => check_app(config_path, &app),
        Err(e) => invalid(config_path, vec![e.to_string()]),
    }
}

/// Compile filters and resolve sink names without starting anything
fn check_app(config_path: String, app: &AppConfig) -> ValidationResult {
    let registry = SinkRegistry::with_defaults();
    let mut errors = Vec::new();

    if let Err(e) = ExcludeFilters::<KubeEvent>::compile(app.exclude_filters.as_slice()) {
        errors.push(format!("excludeFilters: {e}"));
    }
    if let Some(desc) = &app.descriptions {
        if let Err(e) = ExcludeFilters::<KubeObject>::compile(desc.exclude_filters.as_slice()) {
            errors.push(format!("descriptions.excludeFilters: {e}"));
        }
    }
    for sink in &app.sinks {
        if !registry.contains(&sink.name) {
            errors.push(format!(
                "sink with name '{}' is not registered (known: {})",
                sink.name,
                registry.names().join(", ")
            ));
        }
    }

    if !errors.is_empty() {
        return invalid(config_path, errors);
    }

    ValidationResult {
        valid: true,
        config_path,
        errors: Vec::new(),
        warnings: collect_warnings(app),
        summary: Some(ConfigSummary {
            sinks: app.sinks.iter().map(|s| s.name.clone()).collect(),
            exclude_filters: app.exclude_filters.len(),
            description_filters: app
                .descriptions
                .as_ref()
                .map_or(0, |d| d.exclude_filters.len()),
            descriptions: app.descriptions.is_some(),
        }),
    }
}

fn invalid(config_path: String, errors: Vec<String>) -> ValidationResult {
    ValidationResult {
        valid: false,
        config_path,
        errors,
        warnings: Vec::new(),
        summary: None,
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(app: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if app.sinks.is_empty() {
        warnings.push("No sinks configured - notifications will be dropped".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Sinks: {}", summary.sinks.join(", "));
            println!("  Exclude filters: {}", summary.exclude_filters);
            if summary.descriptions {
                println!("  Description filters: {}", summary.description_filters);
            }
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        for error in &result.errors {
            println!("\n  Error: {}", error);
        }
    }
}
