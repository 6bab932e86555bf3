use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use repodex::config::{PipelineConfig, get_config_path};
use repodex::index::IndexKind;
use repodex::pipeline::{Pipeline, UnitOutcome};
use repodex::publish::LocalFsStorage;
use repodex::unit::{JsonLinesSource, UnitKey};
use repodex::{logging, utils};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repodex")]
#[command(about = "Publish per-repository index artifacts under a shared file budget")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the app data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index and publish every unit of a JSON-lines file
    Run {
        /// File with one repository unit per line
        units: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Hide the progress display
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the effective configuration
    Config {
        #[command(flatten)]
        overrides: Overrides,

        /// Save the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
    /// Print the durable artifact paths of a unit
    Paths {
        owner: String,
        repo: String,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Command-line overrides for config values
#[derive(Args, Default)]
struct Overrides {
    /// Number of worker loops (0 = one per CPU)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Root of durable storage
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Root for local staging directories
    #[arg(long)]
    staging_root: Option<PathBuf>,

    /// Language tag used in paths and records
    #[arg(long)]
    language: Option<String>,

    /// Admission ceiling on in-flight files
    #[arg(long)]
    ceiling: Option<u64>,

    /// Aggregate below which admission never blocks
    #[arg(long)]
    low_water_mark: Option<u64>,

    /// Milliseconds between admission checks
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Skip units with more files than this
    #[arg(long)]
    max_files: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(base_path) = self.base_path {
            config.base_path = base_path;
        }
        if let Some(staging_root) = self.staging_root {
            config.staging_root = staging_root;
        }
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(ceiling) = self.ceiling {
            config.admission.ceiling = ceiling;
        }
        if let Some(low_water_mark) = self.low_water_mark {
            config.admission.low_water_mark = low_water_mark;
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config.admission.backoff_ms = backoff_ms;
        }
        if let Some(max_files) = self.max_files {
            config.max_files_per_unit = max_files;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => get_config_path()?,
    };
    let mut config = PipelineConfig::load(&config_path)?;

    match cli.command {
        Commands::Run {
            units,
            overrides,
            quiet,
        } => {
            overrides.apply(&mut config);
            run(config, units, quiet)?;
        }
        Commands::Config { overrides, save } => {
            overrides.apply(&mut config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save(&config_path)?;
                eprintln!("Saved to {}", config_path.display());
            }
        }
        Commands::Paths {
            owner,
            repo,
            overrides,
        } => {
            overrides.apply(&mut config);
            let key = UnitKey::new(owner, repo);
            for kind in IndexKind::ALL {
                println!(
                    "{:10} {}",
                    kind.as_str(),
                    key.durable_path(&config.base_path, &config.language, kind).display()
                );
            }
        }
    }

    Ok(())
}

fn run(config: PipelineConfig, units: PathBuf, quiet: bool) -> Result<()> {
    let source = JsonLinesSource::open(&units)?;
    let pipeline = Pipeline::new(config, LocalFsStorage::new());

    let progress = utils::unit_progress(quiet);
    let stats = pipeline
        .run_with(source, |outcome| {
            progress.inc(1);
            if let UnitOutcome::Done { unit, .. } = outcome {
                progress.set_message(unit.to_string());
            }
        })
        .context("Pipeline aborted")?;
    progress.finish_with_message("done");

    if !quiet {
        println!();
        stats.print_summary();
    }

    Ok(())
}
