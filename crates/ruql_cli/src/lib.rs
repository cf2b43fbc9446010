//! Command-line interface for ruql.
//!
//! # Usage
//!
//! ```bash
//! # Check query documents for syntax and fragment errors
//! ruql check queries/*.graphql
//!
//! # Reject operations nested deeper than 8 fields
//! ruql check --max-depth 8 queries/*.graphql
//!
//! # List operations, variables and fragments of a document
//! ruql inspect query.graphql
//! ruql inspect --format json query.graphql
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use miette::{NamedSource, Report};
use ruql_runtime::merge::{selection_depth, validate_fragments};
use ruql_syntax::{parse, Document, ParseError};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ruql")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check query documents for errors
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum allowed selection depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Print the operations and fragments of a query document
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Print version information
    Version,
}

pub fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Check { files, max_depth } => {
            check_files(&files, max_depth, cli.verbose, cli.quiet)
        }
        Commands::Inspect { file, format } => inspect_file(&file, format),
        Commands::Version => {
            println!("ruql {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

/// Outcome of checking one document.
#[derive(Debug)]
pub enum CheckOutcome {
    Valid { operations: usize, fragments: usize },
    SyntaxError(ParseError),
    Invalid(Vec<String>),
}

/// Parses a document and runs the checks that need no schema.
pub fn check_source(source: &str, max_depth: Option<usize>) -> CheckOutcome {
    let document = match parse(source) {
        Ok(document) => document,
        Err(error) => return CheckOutcome::SyntaxError(error),
    };

    if let Err(error) = validate_fragments(&document) {
        return CheckOutcome::Invalid(vec![format!("{error} ({})", error.location())]);
    }

    let mut problems = Vec::new();
    let fragments = document.fragments();
    if let Some(max) = max_depth {
        for operation in document.operations() {
            let depth = selection_depth(&operation.selection_set, &fragments);
            if depth > max {
                problems.push(format!(
                    "{} {} has depth of {depth}, which exceeds max depth of {max} ({})",
                    operation.operation,
                    operation_label(operation.name.as_ref().map(|n| n.as_str())),
                    operation.location
                ));
            }
        }
    }
    if document.operations().count() > 1 && document.operations().any(|op| op.name.is_none()) {
        problems.push("Anonymous operations must be the only operation in a document".into());
    }

    if problems.is_empty() {
        CheckOutcome::Valid {
            operations: document.operations().count(),
            fragments: fragments.len(),
        }
    } else {
        CheckOutcome::Invalid(problems)
    }
}

fn check_files(
    files: &[PathBuf],
    max_depth: Option<usize>,
    verbose: bool,
    quiet: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut failed = 0;

    for file in files {
        if verbose {
            println!("{} {}", "Checking".blue(), file.display());
        }

        let source = std::fs::read_to_string(file)?;
        match check_source(&source, max_depth) {
            CheckOutcome::Valid {
                operations,
                fragments,
            } => {
                tracing::debug!(file = %file.display(), operations, fragments, "document is valid");
                if verbose {
                    println!("{} {}", "OK".green(), file.display());
                }
            }
            CheckOutcome::SyntaxError(error) => {
                failed += 1;
                let report = Report::new(error)
                    .with_source_code(NamedSource::new(file.display().to_string(), source));
                eprintln!("{report:?}");
            }
            CheckOutcome::Invalid(problems) => {
                failed += 1;
                eprintln!("{} {}", "Error".red().bold(), file.display());
                for problem in problems {
                    eprintln!("  {} {}", "-->".blue(), problem);
                }
            }
        }
    }

    if failed > 0 {
        eprintln!(
            "{} {failed} of {} file(s) failed",
            "Failed:".red().bold(),
            files.len()
        );
        return Ok(1);
    }
    if !quiet {
        println!(
            "{} {} file(s) checked",
            "Success:".green().bold(),
            files.len()
        );
    }
    Ok(0)
}

fn inspect_file(file: &Path, format: OutputFormat) -> Result<i32, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(file)?;
    let document = match parse(&source) {
        Ok(document) => document,
        Err(error) => {
            let report = Report::new(error)
                .with_source_code(NamedSource::new(file.display().to_string(), source));
            eprintln!("{report:?}");
            return Ok(1);
        }
    };

    let summary = summarize(&document);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Pretty => print_summary(&summary),
    }
    Ok(0)
}

/// Describes the operations and fragments of a document. Depth is null when
/// fragments do not resolve.
pub fn summarize(document: &Document) -> Value {
    let fragments = document.fragments();
    let resolvable = validate_fragments(document).is_ok();
    let operations: Vec<Value> = document
        .operations()
        .map(|op| {
            let variables: Vec<Value> = op
                .variables
                .iter()
                .map(|var| {
                    json!({
                        "name": var.name.as_str(),
                        "type": var.ty.to_string(),
                        "default": var.default_value.as_ref().map(ToString::to_string),
                    })
                })
                .collect();
            json!({
                "kind": op.operation.as_str(),
                "name": op.name.as_ref().map(|n| n.as_str()),
                "variables": variables,
                "depth": resolvable.then(|| selection_depth(&op.selection_set, &fragments)),
                "line": op.location.line,
            })
        })
        .collect();
    let fragment_list: Vec<Value> = document
        .fragment_definitions()
        .map(|fragment| {
            json!({
                "name": fragment.name.as_str(),
                "on": fragment.type_condition.as_str(),
                "line": fragment.location.line,
            })
        })
        .collect();

    json!({
        "operations": operations,
        "fragments": fragment_list,
    })
}

fn print_summary(summary: &Value) {
    let empty = Vec::new();
    let operations = summary["operations"].as_array().unwrap_or(&empty);
    let fragments = summary["fragments"].as_array().unwrap_or(&empty);

    println!("{} ({})", "Operations".bold(), operations.len());
    for op in operations {
        println!(
            "  {} {} {}",
            op["kind"].as_str().unwrap_or_default().cyan(),
            operation_label(op["name"].as_str()),
            format!("depth {} line {}", op["depth"], op["line"]).dimmed()
        );
        for var in op["variables"].as_array().unwrap_or(&empty) {
            let default = var["default"]
                .as_str()
                .map(|value| format!(" = {value}"))
                .unwrap_or_default();
            println!(
                "    ${}: {}{default}",
                var["name"].as_str().unwrap_or_default(),
                var["type"].as_str().unwrap_or_default().yellow()
            );
        }
    }

    println!("{} ({})", "Fragments".bold(), fragments.len());
    for fragment in fragments {
        println!(
            "  {} on {} {}",
            fragment["name"].as_str().unwrap_or_default(),
            fragment["on"].as_str().unwrap_or_default().yellow(),
            format!("line {}", fragment["line"]).dimmed()
        );
    }
}

fn operation_label(name: Option<&str>) -> String {
    name.map_or_else(|| "<anonymous>".to_string(), str::to_string)
}
