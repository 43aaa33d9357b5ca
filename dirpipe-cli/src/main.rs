mod cli;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use dirpipe::{Monitor, OperationCatalog};
use std::process;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
    output::EventPrinter,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.json_logs);

    let config = AppConfig::load(args.config.as_deref())?;
    let catalog = OperationCatalog::builtin();

    match args.command {
        Commands::Operations => {
            for kind in catalog.kinds() {
                let name = catalog.create(kind)?.name();
                println!("{:<10} {}", kind, name);
            }
        }

        Commands::Check => {
            let pipeline = config.pipeline(&catalog)?;
            pipeline.preflight().await?;
            println!("Pipeline OK: {}", pipeline.names().join(" -> "));
        }

        Commands::Run {
            dir,
            max_jobs,
            preflight,
            output,
        } => {
            let config = config.with_overrides(dir, max_jobs);
            let directory = config.directory()?.to_path_buf();
            let pipeline = config.pipeline(&catalog)?;
            if preflight {
                pipeline.preflight().await?;
            }

            let monitor = Monitor::new(config.monitor.settings.clone(), pipeline)?;
            let mut events = monitor.subscribe();
            monitor.enable(&directory)?;
            let printer = EventPrinter::new(output, monitor.monitored_directory().as_deref());

            loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            warn!("Failed to listen for Ctrl-C: {}", e);
                        }
                        info!("Shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => printer.print(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event output fell behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            monitor.disable();
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    if json {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
