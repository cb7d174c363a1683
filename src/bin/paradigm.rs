use clap::{command, Parser};
use paradigm::{config::ExperimentConfig, ContextCache, Error, ParameterExpression};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to experiment file
    #[arg(short, long, default_value = "experiment.json")]
    experiment: PathBuf,

    /// Override the number of trials to run
    #[arg(short, long)]
    trials: Option<usize>,

    /// Override the RNG seed
    #[arg(short, long)]
    seed: Option<u64>,
}

fn run(cli: &Cli) -> Result<(), Error> {
    // Load experiment description
    let content = std::fs::read_to_string(&cli.experiment)
        .map_err(|e| Error::Internal(format!("Failed to read experiment file: {}", e)))?;
    let mut config: ExperimentConfig = paradigm::config::from_str(&content)?;

    if let Some(seed) = cli.seed {
        config.engine.seed = Some(seed);
    }
    let trials = cli.trials.unwrap_or(config.trials);

    info!("experiment loaded.");
    debug!("config: {:?}", config);

    let mut cache = ContextCache::standard(&config.engine);
    for decl in &config.parameters {
        let expression = ParameterExpression::parse(&decl.expression)?;
        cache.declare(&decl.name, expression, &decl.label, decl.log)?;
    }

    for trial in 1..=trials {
        cache.invalidate_current_context();
        cache.evaluate_pending_expressions()?;

        if let Some(records) = cache.trial_records() {
            let line = records
                .iter()
                .map(|record| format!("{}={}", record.name, record.value))
                .collect::<Vec<_>>()
                .join("  ");
            println!("trial {:>4}  {}", trial, line);
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
