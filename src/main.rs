use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::json;

use rusty_campbell::data::database::Database;
use rusty_campbell::data::model::Dataset;
use rusty_campbell::import::{BladedOptions, HawcStab2Files, HawcStab2Options, ImportRequest};
use rusty_campbell::state::AppState;

#[derive(Parser)]
#[command(name = "rusty-campbell", version)]
#[command(about = "Campbell diagram database for HAWCStab2 and Bladed linearisation results")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the datasets stored in a database file
    Inspect {
        database: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Import tool results into a database file (created if missing)
    #[command(subcommand)]
    Import(ImportCommand),

    /// Remove one dataset from a database file
    Remove {
        database: PathBuf,

        #[arg(long)]
        tool: String,

        #[arg(long)]
        name: String,
    },
}

#[derive(Args)]
struct Target {
    /// Dataset name (a numeric suffix is added when taken)
    #[arg(long)]
    name: String,

    /// Database file to merge into
    #[arg(long)]
    database: PathBuf,

    /// JSON file with importer options
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ImportCommand {
    /// HAWCStab2 .cmb/.opt text results, optional .amp and binary mode shapes
    Hawcstab2 {
        #[arg(long)]
        cmb: PathBuf,

        #[arg(long)]
        opt: PathBuf,

        #[arg(long)]
        amp: Option<PathBuf>,

        #[arg(long)]
        bin: Option<PathBuf>,

        #[command(flatten)]
        target: Target,
    },

    /// Bladed linearisation summary export
    BladedLin {
        #[arg(long)]
        summary: PathBuf,

        #[command(flatten)]
        target: Target,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    // RUST_LOG, when set, takes precedence over the flags.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn read_options<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading options {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing options {}", path.display()))
}

fn open_or_create(path: &Path) -> Result<Database> {
    if path.exists() {
        Database::load(path).with_context(|| format!("opening database {}", path.display()))
    } else {
        Ok(Database::new())
    }
}

fn inspect(path: &Path, as_json: bool) -> Result<()> {
    let db = Database::load(path).with_context(|| format!("opening database {}", path.display()))?;

    if as_json {
        let groups: Vec<_> = db
            .iter()
            .map(|(key, ds)| {
                json!({
                    "tool": key.tool,
                    "name": key.name,
                    "operating_points": ds.num_operating_points(),
                    "modes": ds.num_modes(),
                    "participation_modes": ds.num_participation_modes(),
                    "operating_parameters": ds.operating_parameters(),
                    "mode_names": ds.modes().iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                    "attributes": ds.attributes(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    println!("{}", summary_table(&db)?);
    Ok(())
}

/// One row per dataset, rendered with arrow's pretty printer.
fn summary_table(db: &Database) -> Result<String> {
    let column = |f: &dyn Fn(&Dataset) -> usize| -> ArrayRef {
        Arc::new(UInt64Array::from_iter_values(db.iter().map(|(_, ds)| f(ds) as u64)))
    };
    let batch = RecordBatch::try_from_iter([
        ("tool", Arc::new(StringArray::from_iter_values(db.iter().map(|(k, _)| k.tool.as_str()))) as ArrayRef),
        ("name", Arc::new(StringArray::from_iter_values(db.iter().map(|(k, _)| k.name.as_str()))) as ArrayRef),
        ("operating points", column(&Dataset::num_operating_points)),
        ("modes", column(&Dataset::num_modes)),
        ("participation modes", column(&Dataset::num_participation_modes)),
    ])?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

fn import(command: ImportCommand) -> Result<()> {
    let (request, target) = match command {
        ImportCommand::Hawcstab2 {
            cmb,
            opt,
            amp,
            bin,
            target,
        } => {
            let options: HawcStab2Options = read_options(target.options.as_deref())?;
            let files = HawcStab2Files { cmb, opt, amp, bin };
            (ImportRequest::HawcStab2 { files, options }, target)
        }
        ImportCommand::BladedLin { summary, target } => {
            let options: BladedOptions = read_options(target.options.as_deref())?;
            (ImportRequest::BladedLin { summary, options }, target)
        }
    };

    let mut state = AppState {
        database: open_or_create(&target.database)?,
        ..AppState::default()
    };
    let report = state.import(&target.name, &request).context("import failed")?;
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if let Some(renamed) = &report.renamed {
        println!("name '{}' was taken, stored as '{}'", renamed.requested, renamed.assigned);
    }

    state
        .save_database(&target.database, None)
        .with_context(|| format!("saving database {}", target.database.display()))?;
    println!("stored {} in {}", report.key, target.database.display());
    Ok(())
}

fn remove(path: &Path, tool: &str, name: &str) -> Result<()> {
    let mut db = Database::load(path).with_context(|| format!("opening database {}", path.display()))?;
    db.remove(tool, name)?;
    db.save(path, None)
        .with_context(|| format!("saving database {}", path.display()))?;
    println!("removed {tool} / {name}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Inspect { database, json } => inspect(&database, json),
        Command::Import(command) => import(command),
        Command::Remove {
            database,
            tool,
            name,
        } => remove(&database, &tool, &name),
    }
}
