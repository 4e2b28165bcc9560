//! varfleet CLI: worker handler, batch runs, audit and result projections.
//!
//! Commands:
//! - `worker`: answer one analysis invocation read from stdin
//! - `analyse`: warm up a pool, run one batch, print the run, release the pool
//! - `results`: per-signal VaR and profit/loss from the combined log
//! - `audit`: list recorded runs
//! - `reset`: delete all result logs (the audit log is kept)

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use varfleet_core::domain::{DEFAULT_CHECK_DAYS, DEFAULT_MINHISTORY, DEFAULT_SHOTS};
use varfleet_core::handler::{handle_invocation, handle_json};
use varfleet_core::{AnalysisParams, TransactionType};
use varfleet_runner::{
    AggregateRun, AnalyseError, Backend, Collaborators, Orchestrator, RunStatus, ServiceConfig,
};

#[derive(Parser)]
#[command(
    name = "varfleet",
    about = "varfleet: signal-conditioned Monte Carlo VaR on a worker fleet"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one analysis request read from stdin.
    Worker {
        /// Expect a raw request and print a raw response instead of a
        /// status-code envelope.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Warm up a pool, run one batch and print the aggregate run as JSON.
    Analyse {
        /// Path to a TOML service config. Defaults apply without one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// serverless (alias lambda) or fleet (alias ec2).
        #[arg(long, default_value = "serverless")]
        backend: Backend,

        /// Number of workers (replication factor).
        #[arg(short, long, default_value_t = 1)]
        replicas: usize,

        /// Trailing window length per signal.
        #[arg(long, default_value_t = DEFAULT_MINHISTORY)]
        minhistory: usize,

        /// Monte Carlo draws per signal.
        #[arg(long, default_value_t = DEFAULT_SHOTS)]
        shots: usize,

        /// Transaction type: buy or sell.
        #[arg(short = 't', long = "type", default_value = "buy")]
        transaction_type: TransactionType,

        /// Holding period in trading days.
        #[arg(short = 'p', long = "check-days", default_value_t = DEFAULT_CHECK_DAYS)]
        check_days: usize,

        /// Master seed. Without one every run draws fresh entropy.
        #[arg(long)]
        seed: Option<u64>,

        /// Read prices from this CSV instead of the configured source.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Symbol to fetch (overrides the config).
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Print per-signal VaR, profit/loss and their aggregates.
    Results {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the audit log.
    Audit {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Delete all result logs.
    Reset {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker { raw } => run_worker(raw),
        Commands::Analyse {
            config,
            backend,
            replicas,
            minhistory,
            shots,
            transaction_type,
            check_days,
            seed,
            csv,
            symbol,
        } => {
            let mut service_config = load_config(config.as_deref())?;
            if let Some(path) = csv {
                service_config.market.csv_path = Some(path);
            }
            if let Some(symbol) = symbol {
                service_config.market.symbol = symbol;
            }
            let params = AnalysisParams {
                minhistory,
                shots,
                transaction_type,
                check_days,
                seed,
            };
            run_analyse(service_config, backend, replicas, params)
        }
        Commands::Results { config } => run_results(config.as_deref()),
        Commands::Audit { config } => run_audit(config.as_deref()),
        Commands::Reset { config } => run_reset(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ServiceConfig::default()),
    }
}

fn build_orchestrator(config: ServiceConfig) -> Result<Orchestrator> {
    let collaborators = Collaborators::from_config(&config)?;
    Ok(Orchestrator::new(config, collaborators))
}

fn run_worker(raw: bool) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading request from stdin")?;

    let output = if raw {
        serde_json::to_string(&handle_json(&input)?)?
    } else {
        serde_json::to_string(&handle_invocation(&input))?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}")?;
    Ok(())
}

fn run_analyse(
    config: ServiceConfig,
    backend: Backend,
    replicas: usize,
    params: AnalysisParams,
) -> Result<()> {
    let mut orchestrator = build_orchestrator(config)?;

    let report = orchestrator.warmup(backend, replicas)?;
    if !report.ready {
        orchestrator.terminate()?;
        bail!("{backend} pool of {replicas} is not ready");
    }
    info!(
        billable_secs = report.warmup_cost.billable_secs,
        cost = report.warmup_cost.cost,
        "warmup cost"
    );

    let outcome = orchestrator.analyse(params);
    if let Err(e) = orchestrator.terminate() {
        warn!(error = %e, "failed to release pool");
    }

    let run = match outcome {
        Ok(run) => run,
        Err(AnalyseError::Persistence { source, records }) => {
            eprintln!("Results were computed but not saved ({} records):", records.len());
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Err(anyhow::Error::new(source).context("persisting results"));
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&run)?);
    print_summary(&run);
    Ok(())
}

fn print_summary(run: &AggregateRun) {
    eprintln!();
    eprintln!("=== Run {} ===", run.run_id);
    eprintln!(
        "Status:         {}",
        match run.status {
            RunStatus::Completed => "completed",
            RunStatus::NoResults => "no results",
        }
    );
    eprintln!("Signals:        {}", run.results.len());
    eprintln!("Failed workers: {}", run.failed_workers);
    eprintln!("Avg VaR95:      {:.5}", run.averages.avg_var95);
    eprintln!("Avg VaR99:      {:.5}", run.averages.avg_var99);
    eprintln!("Total P/L:      {:.5}", run.averages.total_profit_loss);
    eprintln!("Elapsed:        {:.2}s", run.elapsed_secs);
    eprintln!("Est. cost:      ${:.6}", run.cost);
    if let Some(path) = &run.persisted_path {
        eprintln!("Saved to:       {path}");
    }
}

fn run_results(config: Option<&Path>) -> Result<()> {
    let orchestrator = build_orchestrator(load_config(config)?)?;
    let vars = orchestrator.sig_var9599()?;
    if vars.is_empty() {
        println!("No results stored.");
        return Ok(());
    }
    let profit_loss = orchestrator.sig_profit_loss()?;
    let (avg95, avg99) = orchestrator.avg_var9599()?;

    println!("{:<8} {:>12} {:>12} {:>12}", "Signal", "VaR95", "VaR99", "P/L");
    println!("{}", "-".repeat(47));
    for (var, pl) in vars.iter().zip(&profit_loss) {
        let pl = pl
            .profit_loss
            .map_or_else(|| "-".to_string(), |v| format!("{v:.5}"));
        println!(
            "{:<8} {:>12.5} {:>12.5} {:>12}",
            var.signal_index, var.var95, var.var99, pl
        );
    }
    println!();
    println!("Average VaR95:  {avg95:.5}");
    println!("Average VaR99:  {avg99:.5}");
    println!("Total P/L:      {:.5}", orchestrator.tot_profit_loss()?);
    Ok(())
}

fn run_audit(config: Option<&Path>) -> Result<()> {
    let orchestrator = build_orchestrator(load_config(config)?)?;
    let entries = orchestrator.audit()?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run_reset(config: Option<&Path>) -> Result<()> {
    let mut orchestrator = build_orchestrator(load_config(config)?)?;
    let removed = orchestrator.reset()?;
    println!("Removed {removed} result log(s).");
    Ok(())
}
