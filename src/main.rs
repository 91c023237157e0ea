//! sweepctl - Main entry point
//!
//! One invocation runs one workflow step. The batch scheduler calls
//! `prepare` before a round and `collect` after it.

use sweepctl::cli::{Cli, Commands};
use sweepctl::orchestrator::{CollectOutcome, Orchestrator, PrepareOutcome};
use sweepctl::{AppendOutcome, Generation, SweepError};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber; RUST_LOG overrides the default level
fn init_logging(verbose: bool) {
    let default = if verbose { "sweepctl=debug" } else { "sweepctl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main application entry point
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli.command);

    if let Err(e) = run(&cli) {
        error!("{}", e);
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), SweepError> {
    info!("Using workflow configuration {:?}", cli.config);
    let orchestrator = Orchestrator::from_file(&cli.config)?;

    match &cli.command {
        Commands::Prepare => match orchestrator.prepare()? {
            PrepareOutcome::Generation {
                generation,
                graph,
                jobs,
                skipped,
            } => {
                println!(
                    "✓ Generation {} prepared: {} jobs in {}",
                    generation,
                    jobs,
                    graph.path.display()
                );
                if skipped > 0 {
                    println!("  {} jobs skipped (see log)", skipped);
                }
            }
            PrepareOutcome::Sweep {
                graph,
                samples,
                unique,
                skipped,
            } => {
                println!(
                    "✓ Sweep prepared: {} samples, {} unique jobs in {}",
                    samples,
                    unique,
                    graph.path.display()
                );
                if skipped > 0 {
                    println!("  {} jobs skipped (see log)", skipped);
                }
            }
        },
        Commands::Collect => match orchestrator.collect()? {
            CollectOutcome::Generation {
                generation,
                appended,
                missing,
                signal,
            } => {
                match appended {
                    AppendOutcome::Appended { rows } => println!(
                        "✓ Generation {} collected: {} rows ({} missing)",
                        generation, rows, missing
                    ),
                    AppendOutcome::AlreadyPresent => {
                        println!("✓ Generation {} was already collected", generation)
                    }
                }
                println!("  Next round: {}", signal);
            }
            CollectOutcome::Sweep {
                rows,
                missing,
                report,
            } => {
                println!("✓ Sweep collected: {} rows ({} unique jobs missing)", rows, missing);
                for (indicator, index) in &report.indicators {
                    println!("  {}: {}", indicator, index.ranking.join(" > "));
                }
                for indicator in &report.skipped {
                    println!("  {}: skipped (no usable runs)", indicator);
                }
            }
        },
        Commands::Decide { generation } => {
            let signal = orchestrator.decide(Generation::new(*generation))?;
            println!("✓ Generation {}: {}", generation, signal);
        }
        Commands::Status => {
            let status = orchestrator.status()?;
            println!("Mode:          {}", status.mode);
            match status.max_generations {
                Some(max) => println!("Generation:    {} of {}", status.generation, max),
                None => println!("Generation:    {}", status.generation),
            }
            println!(
                "Current graph: {}",
                status.current_graph.as_deref().unwrap_or("(none)")
            );
            println!("Sentinel:      {}", status.signal);
            match status.table_rows {
                Some(rows) => println!("Table rows:    {}", rows),
                None => println!("Table rows:    (no table yet)"),
            }
        }
        Commands::Validate => {
            let report = orchestrator.check()?;
            for line in &report.skipped_lines {
                println!(
                    "  line {} skipped ({}): {}",
                    line.line_number, line.reason, line.content
                );
            }
            for label in &report.unresolved_scopes {
                println!("  {}: scope resolves to no spatial unit", label);
            }
            println!(
                "✓ Configuration is valid: {} parameters, {} samples per batch",
                report.parameters, report.samples_per_batch
            );
        }
    }

    Ok(())
}
