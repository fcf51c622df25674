/*!
clinviz Command Line Interface

Provides commands for running natural-language chart requests against CSV
tables and inspecting the intermediate pipeline stages.
*/

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clinviz::pipeline::{run_traced, Outcome};
use clinviz::schema::SchemaSet;
use clinviz::vocab::Vocabulary;
use clinviz::{merge, parser, reader, DataFrame, VERSION};

#[derive(Parser)]
#[command(name = "clinviz")]
#[command(about = "Natural-language charting for clinical tabular data")]
#[command(version = VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a request end to end and emit the chart specification
    Chart {
        /// The natural-language request
        query: String,

        /// Source table as name=path.csv (repeatable)
        #[arg(long = "table", value_name = "NAME=PATH")]
        tables: Vec<String>,

        /// Output file path for the spec JSON (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the parser's decision trace
        #[arg(long)]
        trace: bool,
    },

    /// Parse a request and show the intent (for debugging)
    Parse {
        /// The natural-language request
        query: String,

        /// Source table as name=path.csv (repeatable)
        #[arg(long = "table", value_name = "NAME=PATH")]
        tables: Vec<String>,

        /// Output format for the intent (json, debug, pretty)
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Show the merge plan a request would execute
    Plan {
        /// The natural-language request
        query: String,

        /// Source table as name=path.csv (repeatable)
        #[arg(long = "table", value_name = "NAME=PATH")]
        tables: Vec<String>,
    },

    /// Compile a request and validate the spec without executing the merge
    Validate {
        /// The natural-language request
        query: String,

        /// Source table as name=path.csv (repeatable)
        #[arg(long = "table", value_name = "NAME=PATH")]
        tables: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let vocab = Vocabulary::clinical();

    match cli.command {
        Commands::Chart {
            query,
            tables,
            output,
            trace,
        } => {
            let tables = load_tables(&tables)?;
            let (outcome, parse_trace) = run_traced(&query, &tables, &vocab)?;

            if trace {
                eprintln!("{}", parse_trace);
            }

            match outcome {
                Outcome::Chart { spec, table } => {
                    eprintln!("{}", table);
                    let json = serde_json::to_string_pretty(&spec)?;
                    match output {
                        Some(path) => {
                            std::fs::write(&path, &json)?;
                            println!("Spec written to: {}", path.display());
                        }
                        None => println!("{}", json),
                    }
                }
                Outcome::NeedsClarification { intent, .. } => {
                    eprintln!("The request is ambiguous; please be more specific.");
                    eprintln!(
                        "Mentioned columns: {}",
                        intent.mentioned_columns.join(", ")
                    );
                    std::process::exit(1);
                }
            }
        }

        Commands::Parse {
            query,
            tables,
            format,
        } => {
            let tables = load_tables(&tables)?;
            let schemas = SchemaSet::detect(&tables);
            let (intent, trace) = parser::Parser::new(&schemas, &vocab).parse_with_trace(&query);

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&intent)?),
                "debug" => println!("{:#?}", intent),
                "pretty" => {
                    println!("Intent for: {}", query);
                    println!(
                        "  chart type: {}",
                        intent
                            .chart_type
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "(unresolved)".to_string())
                    );
                    println!(
                        "  x axis: {}",
                        intent.x_axis.as_deref().unwrap_or("(unresolved)")
                    );
                    println!("  y axis: {:?}", intent.y_axis);
                    println!("  filters: {}", intent.filters.len());
                    for filter in &intent.filters {
                        println!(
                            "    {} {} {}",
                            filter.column, filter.operator, filter.value
                        );
                    }
                    println!("  mentioned: {}", intent.mentioned_columns.join(", "));
                    println!("\nDecisions:\n{}", trace);
                }
                _ => {
                    eprintln!("Unknown format: {}", format);
                    std::process::exit(1);
                }
            }
        }

        Commands::Plan { query, tables } => {
            let tables = load_tables(&tables)?;
            let schemas = SchemaSet::detect(&tables);
            let intent = parser::parse(&query, &schemas, &vocab);
            if !intent.is_complete() {
                eprintln!("The request is ambiguous; no plan can be built.");
                std::process::exit(1);
            }
            let plan = merge::plan(&intent, &schemas, &vocab)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Validate { query, tables } => {
            let tables = load_tables(&tables)?;
            let schemas = SchemaSet::detect(&tables);
            let intent = parser::parse(&query, &schemas, &vocab);

            // Without executing the merge, the spec is checked against the
            // combined schema plus the aggregate columns it would produce.
            let mut columns = schemas.columns();
            for metric in intent.metrics() {
                for agg in &intent.statistics.aggregation {
                    columns.push(clinviz::ColumnInfo {
                        name: agg.column_name(metric),
                        column_type: clinviz::ColumnType::Quantitative,
                    });
                }
            }

            let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            let spec = clinviz::spec::compile(&intent, &names);
            let validated = clinviz::validate::validate(&spec, &columns);

            for warning in validated.warnings() {
                println!("warning: {}", warning.message);
            }
            for error in validated.errors() {
                println!("error: {}", error.message);
            }
            if validated.valid() {
                println!("Spec is valid.");
            } else {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Parse repeated `name=path.csv` table arguments and load each file.
fn load_tables(specs: &[String]) -> anyhow::Result<Vec<(String, DataFrame)>> {
    if specs.is_empty() {
        anyhow::bail!("at least one --table name=path.csv is required");
    }
    let mut tables = Vec::new();
    for spec in specs {
        let Some((name, path)) = spec.split_once('=') else {
            anyhow::bail!("invalid --table '{}', expected name=path.csv", spec);
        };
        let df = reader::read_csv(std::path::Path::new(path))?;
        tables.push((name.to_string(), df));
    }
    Ok(tables)
}
