use std::path::Path;

use clap::Parser;
use mimalloc::MiMalloc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use stigkit::config::{AppConfig, LogFormat};
use stigkit::errors::{ChecklistError, CommandResponse};
use stigkit::models::directive::{RuleDirective, SeverityDirective};
use stigkit::parsers::xccdf::XccdfParser;
use stigkit::services::assess::{self, AssessOptions, ParameterFile};
use stigkit::services::identity::SystemClock;
use stigkit::services::{rule_update, severity_update, store, summary, target};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

use cli::{Cli, Commands};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// What a command produced: a JSON payload and its human-readable rendering.
struct CommandOutput {
    data: Value,
    text: String,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match run(cli.command, &config) {
        Ok(output) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&CommandResponse::success(output.data))?);
            Ok(())
        }
        Ok(output) => {
            print!("{}", output.text);
            Ok(())
        }
        Err(e) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&CommandResponse::from_error(&e))?);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "stigkit=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn run(command: Commands, config: &AppConfig) -> Result<CommandOutput, ChecklistError> {
    match command {
        Commands::Parse { benchmark, output } => {
            let checklist = XccdfParser::new().parse_file(&benchmark)?;
            let digest = store::write(&checklist, &output)?;
            let rules = checklist.rule_count();
            Ok(CommandOutput {
                data: json!({
                    "output_path": output,
                    "output_digest": digest,
                    "rules": rules,
                }),
                text: format!(
                    "Parsed {rules} rules from {} into {}\n",
                    benchmark.display(),
                    output.display()
                ),
            })
        }
        Commands::UpdateRules {
            checklist,
            directives,
        } => {
            let directives: Vec<RuleDirective> = read_json(&directives)?;
            let outcome = rule_update::update_rules(&checklist, &directives)?;
            Ok(CommandOutput {
                text: summary::render_rule_log(&outcome.report),
                data: to_data(&outcome.report)?,
            })
        }
        Commands::UpdateSeverity {
            checklist,
            directives,
        } => {
            let directives: Vec<SeverityDirective> = read_json(&directives)?;
            let result = severity_update::update_severity(
                &checklist,
                &directives,
                config.summary_sample_limit,
            )?;
            Ok(CommandOutput {
                text: summary::render_severity_log(&result.outcome.report, &result.summaries),
                data: json!({
                    "report": to_data(&result.outcome.report)?,
                    "summaries": to_data(&result.summaries)?,
                }),
            })
        }
        Commands::SetTarget {
            checklist,
            connection,
        } => {
            let outcome = target::update_target(&checklist, &connection, &config.domain_suffix)?;
            let report = &outcome.report;
            let mut text = String::new();
            if let Some(path) = &report.output_path {
                text.push_str(&format!("Updated checklist saved to {}\n", path.display()));
            }
            for change in &report.target_changes {
                text.push_str(&format!(
                    "  {}: {} → {}\n",
                    change.field, change.old_value, change.new_value
                ));
            }
            Ok(CommandOutput {
                text,
                data: to_data(report)?,
            })
        }
        Commands::Assess {
            template,
            parameters,
            target,
            cat_ii_default,
            results_dir,
        } => {
            let file: ParameterFile = read_json(&parameters)?;
            let default_name = target.unwrap_or_else(|| {
                parameters
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "target".to_string())
            });
            let targets = file.into_targets(&default_name);

            let mut options = AssessOptions::from_config(config);
            options.cat_ii_default = cat_ii_default.map(Into::into);
            if let Some(dir) = results_dir {
                options.results_dir = dir;
            }

            let results = assess::assess_targets(&template, &targets, &options, &SystemClock);
            let mut text = String::new();
            let mut data = Vec::new();
            for result in &results {
                let report = &result.outcome.report;
                text.push_str(&format!(
                    "{}: {} rules updated, saved to {}\n",
                    result.target,
                    report.rules_touched(),
                    report
                        .output_path
                        .as_deref()
                        .unwrap_or(&result.baseline)
                        .display()
                ));
                data.push(json!({
                    "target": result.target,
                    "baseline": result.baseline,
                    "report": to_data(report)?,
                }));
            }
            text.push_str(&format!("Assessed {} of {} targets\n", results.len(), targets.len()));
            Ok(CommandOutput {
                data: Value::Array(data),
                text,
            })
        }
        Commands::ExportCsv { input, output } => {
            let changes = summary::load_change_records(&input)?;
            summary::export_csv(&changes, &output)?;
            Ok(CommandOutput {
                data: json!({ "output_path": output, "rows": changes.len() }),
                text: format!("Wrote {} rows to {}\n", changes.len(), output.display()),
            })
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ChecklistError> {
    let bytes = store::read_snapshot(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ChecklistError::Format(format!("{}: {e}", path.display())))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ChecklistError> {
    serde_json::to_value(value)
        .map_err(|e| ChecklistError::Format(format!("Failed to serialize output: {e}")))
}
