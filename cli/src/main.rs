//! Trellis CLI: command-line interface for the Trellis RDF database
//!
//! Loads Turtle/N-Triples files into an in-memory store and runs SPARQL
//! queries against it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use trellis::rdf::{RdfFormat, RdfSerializer};
use trellis::{Database, QueryResults, ResultFormat, SparqlEngine, TrellisConfig};

#[derive(Parser)]
#[command(name = "trellis", version, about = "Trellis RDF database CLI")]
struct Cli {
    /// Turtle or N-Triples files to load before running the command
    #[arg(long, global = true, num_args = 1..)]
    data: Vec<PathBuf>,

    /// Base IRI for relative IRIs in the data files
    #[arg(long, global = true)]
    base: Option<String>,

    /// YAML configuration file
    #[arg(long, global = true, env = "TRELLIS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Text,
    Json,
    Csv,
    Tsv,
}

impl OutputFormat {
    fn result_format(self) -> Option<ResultFormat> {
        match self {
            OutputFormat::Table => None,
            OutputFormat::Text => Some(ResultFormat::Text),
            OutputFormat::Json => Some(ResultFormat::Json),
            OutputFormat::Csv => Some(ResultFormat::Csv),
            OutputFormat::Tsv => Some(ResultFormat::Tsv),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a SPARQL query
    Query {
        /// The SPARQL query string
        sparql: String,

        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Print the loaded data
    Dump {
        /// Write N-Triples instead of Turtle
        #[arg(long)]
        ntriples: bool,
    },
    /// Show store statistics
    Stats,
    /// Start an interactive REPL
    Shell {
        /// Output format for query results
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TrellisConfig::from_path(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => TrellisConfig::default(),
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    let db = Database::with_config(config);
    for path in &cli.data {
        load_file(&db, path, cli.base.as_deref())?;
    }

    match cli.command {
        Commands::Query { sparql, format } => run_query(&db, &sparql, format),
        Commands::Dump { ntriples } => run_dump(&db, ntriples),
        Commands::Stats => run_stats(&db),
        Commands::Shell { format } => run_shell(&db, cli.base.as_deref(), format),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let level = tracing::Level::from_str(level)
        .map_err(|_| anyhow::anyhow!("invalid log level '{}'", level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_file(db: &Database, path: &Path, base: Option<&str>) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let added = db
        .store()
        .load_turtle(&text, base)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(added)
}

fn run_query(db: &Database, sparql: &str, format: OutputFormat) -> Result<()> {
    let results = SparqlEngine::new(db.store()).query(sparql)?;
    let namespaces = db.config().serializer.namespaces();

    let Some(result_format) = format.result_format() else {
        print_table(&results, db)?;
        return Ok(());
    };
    let text = results.serialize_with(result_format, &namespaces)?;
    print!("{}", text);
    if !text.ends_with('\n') && !text.is_empty() {
        println!();
    }
    Ok(())
}

fn print_table(results: &QueryResults, db: &Database) -> Result<()> {
    match results {
        QueryResults::Solutions { variables, rows } => {
            if variables.is_empty() {
                println!("(no results)");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(variables);

            for row in rows {
                let cells: Vec<String> = row
                    .values()
                    .iter()
                    .map(|value| value.as_ref().map(ToString::to_string).unwrap_or_default())
                    .collect();
                table.add_row(cells);
            }

            println!("{}", table);
            println!("{} row(s)", rows.len());
        }
        QueryResults::Boolean(value) => println!("{}", value),
        QueryResults::Graph(_) => {
            let namespaces = db.config().serializer.namespaces();
            print!("{}", results.serialize_with(ResultFormat::Text, &namespaces)?);
        }
    }
    Ok(())
}

fn run_dump(db: &Database, ntriples: bool) -> Result<()> {
    let store = db.store().read();
    let format = if ntriples {
        RdfFormat::NTriples
    } else {
        RdfFormat::Turtle
    };
    let text = RdfSerializer::serialize(store.iter(), format, &db.config().serializer.namespaces())?;
    print!("{}", text);
    Ok(())
}

fn run_stats(db: &Database) -> Result<()> {
    let store = db.store().read();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Triples".to_string(), store.count().to_string()]);
    table.add_row(vec!["Terms".to_string(), store.term_count().to_string()]);
    table.add_row(vec!["Subjects".to_string(), store.subjects().len().to_string()]);
    table.add_row(vec!["Predicates".to_string(), store.predicates().len().to_string()]);
    table.add_row(vec!["Objects".to_string(), store.objects().len().to_string()]);

    println!("{}", table);
    Ok(())
}

fn run_shell(db: &Database, base: Option<&str>, format: OutputFormat) -> Result<()> {
    println!("Trellis Interactive Shell");
    println!("Type SPARQL queries, or .help for commands. .quit to exit.\n");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock();
    let mut line = String::new();

    loop {
        eprint!("trellis> ");
        std::io::stderr().flush()?;

        line.clear();
        if lines.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match shell_command(db, base, format, trimmed) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    println!("Bye!");
    Ok(())
}

/// Run one shell line; `false` ends the session
fn shell_command(db: &Database, base: Option<&str>, format: OutputFormat, input: &str) -> Result<bool> {
    let (command, argument) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    match command {
        ".quit" | ".exit" | ".q" => return Ok(false),
        ".help" | ".h" => {
            println!("Commands:");
            println!("  .load <file>  Load a Turtle or N-Triples file");
            println!("  .count        Number of triples");
            println!("  .clear        Remove all triples");
            println!("  .dump         Print the store as Turtle");
            println!("  .quit         Exit shell");
            println!("  <sparql>      Execute a SPARQL query");
        }
        ".load" => {
            if argument.is_empty() {
                bail!("usage: .load <file>");
            }
            let added = load_file(db, Path::new(argument), base)?;
            println!("Loaded {} triple(s)", added);
        }
        ".count" => println!("{}", db.count()),
        ".clear" => {
            db.clear();
            println!("Cleared");
        }
        ".dump" => run_dump(db, false)?,
        _ if command.starts_with('.') => bail!("unknown command '{}', try .help", command),
        _ => run_query(db, input, format)?,
    }
    Ok(true)
}
