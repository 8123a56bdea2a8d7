//! symposium - run a dining-philosophers table
//!
//! Usage:
//!   symposium [options]
//!
//! Options:
//!   --philosophers <n>   Philosophers at the table (default 5)
//!   --meals <n>          Meals each philosopher must eat (default 3)
//!   --config <path>      JSON table configuration
//!   --seed <n>           Seed the delay generators / simulation schedule
//!   --timeout-ms <n>     Give up after this many milliseconds (0 disables)
//!   --immediate          No delays; every wait is a scheduler yield
//!   --simulate           Deterministic single-threaded run
//!   --json               Print events and the summary as JSON lines
//!
//! Environment:
//!   SYMPOSIUM_PHILOSOPHERS, SYMPOSIUM_MEALS, SYMPOSIUM_TIMEOUT_MS
//!   RUST_LOG (default: symposium=info,symposium_table=info)

mod settings;

use std::sync::Arc;

use symposium_table::{
    Coordinator, EventSink, PhilosopherReport, Schedule, Simulation, SimulationConfig, TableEvent,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::{Options, Output};

fn print_usage() {
    eprintln!("symposium - run a dining-philosophers table");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  symposium [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --philosophers <n>   Philosophers at the table (default 5)");
    eprintln!("  --meals <n>          Meals each philosopher must eat (default 3)");
    eprintln!("  --config <path>      JSON table configuration");
    eprintln!("  --seed <n>           Seed delays / simulation schedule");
    eprintln!("  --timeout-ms <n>     Give up after this many milliseconds (0 disables)");
    eprintln!("  --immediate          No delays");
    eprintln!("  --simulate           Deterministic single-threaded run");
    eprintln!("  --json               JSON lines output");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SYMPOSIUM_PHILOSOPHERS  SYMPOSIUM_MEALS  SYMPOSIUM_TIMEOUT_MS");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symposium=info,symposium_table=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = match Options::parse(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    let config = settings::load(&options)?;
    tracing::info!(
        philosophers = config.philosophers,
        meals = config.meals,
        simulate = options.simulate,
        "Starting symposium"
    );

    // Events are printed by one task so lines never interleave.
    let (tx, rx) = mpsc::unbounded_channel::<TableEvent>();
    let printer = tokio::spawn(print_events(rx, options.output));
    let sink: Arc<dyn EventSink> = Arc::new(tx);

    let reports = if options.simulate {
        let schedule = Schedule::Shuffled {
            seed: config.seed.unwrap_or(42),
        };
        let simulation = Simulation::new(SimulationConfig::from_table(&config, schedule), sink)?;
        let outcome = simulation.run()?;
        tracing::info!(
            steps = outcome.steps,
            rounds = outcome.rounds,
            peak_eating = outcome.peak_eating,
            "Simulation complete"
        );
        outcome.reports
    } else {
        let coordinator = Coordinator::new(config.clone(), sink)?;
        let cancel = coordinator.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, letting meals in progress finish");
                cancel.cancel();
            }
        });
        coordinator.run().await?.reports
    };

    // All senders are gone once the run has returned.
    printer.await?;
    print_summary(&reports, config.meals, options.output)?;
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<TableEvent>, output: Output) {
    while let Some(event) = rx.recv().await {
        match output {
            Output::Text => println!("{event}"),
            Output::Json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
            },
        }
    }
}

fn print_summary(
    reports: &[PhilosopherReport],
    meals: u32,
    output: Output,
) -> Result<(), serde_json::Error> {
    match output {
        Output::Json => {
            for report in reports {
                println!("{}", serde_json::to_string(report)?);
            }
        }
        Output::Text => {
            println!("Everyone is full and ate: {meals} times");
            println!();
            println!("  seat  meals  attempts  contentions  longest streak");
            for r in reports {
                println!(
                    "  {:>4}  {:>5}  {:>8}  {:>11}  {:>14}",
                    r.id.0, r.meals, r.attempts, r.contentions, r.longest_streak
                );
            }
        }
    }
    Ok(())
}
