mod commands;
mod config;
mod render;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use commands::OperatorCommand;
use console_core::{CommandResult, ConsoleController, ConsoleEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for the market-making backend")]
struct Args {
    /// Config file; `console.toml` in the working directory is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backend session status.
    Status,
    /// Tradable instruments.
    Products,
    /// Reference price of an instrument (defaults to the configured ticker).
    Price { symbol: Option<String> },
    /// One telemetry snapshot.
    Stats,
    /// Open orders and position detail.
    Account,
    Start(StartArgs),
    Stop,
    /// Flatten every open position.
    CloseAll,
    CancelAll,
    /// Live view: streams logs and telemetry, reads commands from stdin.
    Watch,
}

#[derive(clap::Args, Debug)]
struct StartArgs {
    #[arg(long)]
    ticker: Option<String>,
    #[arg(long)]
    quantity: Option<f64>,
    #[arg(long)]
    spread: Option<f64>,
    /// Seconds between strategy cycles.
    #[arg(long)]
    interval: Option<u64>,
    #[arg(long)]
    boost: bool,
    #[arg(long)]
    max_exposure: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let overrides = config::Overrides {
        backend_url: args.backend_url.clone(),
        poll_interval_ms: args.poll_interval_ms,
    };
    let settings = config::load_settings(
        args.config.as_deref(),
        |key| std::env::var(key).ok(),
        &overrides,
    )?;
    let controller = ConsoleController::new(settings).context("failed to set up backend client")?;

    match args.command.unwrap_or(Command::Watch) {
        Command::Status => {
            let status = controller.telemetry().fetch_status().await?;
            println!("{status}");
        }
        Command::Products => {
            let catalog = controller.telemetry().fetch_catalog().await?;
            println!("{}", render::catalog(&catalog));
        }
        Command::Price { symbol } => {
            let symbol = symbol.unwrap_or_else(|| controller.settings().strategy.ticker.clone());
            let price = controller.telemetry().fetch_price(&symbol).await?;
            println!("{symbol} {price}");
        }
        Command::Stats => {
            let snapshot = controller.telemetry().fetch_stats().await?;
            println!("{}", render::snapshot(&snapshot));
        }
        Command::Account => {
            let detail = controller.account().await?;
            println!("{}", render::account(&detail));
        }
        Command::Start(start) => {
            controller.mount_status_only().await;
            controller
                .edit_config(|config| {
                    if let Some(v) = start.ticker {
                        config.ticker = v;
                    }
                    if let Some(v) = start.quantity {
                        config.quantity = v;
                    }
                    if let Some(v) = start.spread {
                        config.spread = v;
                    }
                    if let Some(v) = start.interval {
                        config.interval = v;
                    }
                    if start.boost {
                        config.boost_mode = true;
                    }
                    if let Some(v) = start.max_exposure {
                        config.max_exposure = v;
                    }
                })
                .await;
            one_shot(controller.start().await)?;
        }
        Command::Stop => {
            controller.mount_status_only().await;
            one_shot(controller.stop().await)?;
        }
        Command::CloseAll => one_shot(controller.close_all().await)?,
        Command::CancelAll => one_shot(controller.cancel_all().await)?,
        Command::Watch => run_watch(&controller).await?,
    }

    Ok(())
}

fn one_shot(result: CommandResult) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!("{}", render::outcome(&outcome));
            Ok(())
        }
        Err(err) => bail!("{err}"),
    }
}

async fn run_watch(controller: &ConsoleController) -> Result<()> {
    let mut events = BroadcastStream::new(controller.subscribe_events());
    controller.mount().await;
    println!("{}", render::view(&controller.view().await));
    println!("{}", commands::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => print_event(event),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "console: display fell behind, events skipped");
                }
                None => break,
            },
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match OperatorCommand::parse(&line) {
                    Ok(OperatorCommand::Quit) => break,
                    Ok(command) => execute(controller, command).await,
                    Err(err) => eprintln!("{err}"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.unmount().await;
    Ok(())
}

fn print_event(event: ConsoleEvent) {
    match event {
        ConsoleEvent::Log(entry) => println!("{}", render::log_line(&entry)),
        ConsoleEvent::SnapshotUpdated(snapshot) => println!("{}", render::snapshot(&snapshot)),
        ConsoleEvent::PollFailed(reason) => eprintln!("telemetry poll failed: {reason}"),
        ConsoleEvent::StatusChanged(status) => println!("status: {status}"),
        ConsoleEvent::CatalogLoaded(catalog) => println!("{} instruments available", catalog.len()),
        ConsoleEvent::PriceUpdated { symbol, price } => println!("{symbol} price {price:.2}"),
        ConsoleEvent::StatusDiscrepancy { local, backend } => {
            println!("!! console shows {local} but backend reports {backend}");
        }
        ConsoleEvent::LogStreamClosed(_) => {}
    }
}

async fn execute(controller: &ConsoleController, command: OperatorCommand) {
    let result = match command {
        OperatorCommand::Start => Some(controller.start().await),
        OperatorCommand::Stop => Some(controller.stop().await),
        OperatorCommand::CloseAll => Some(controller.close_all().await),
        OperatorCommand::CancelAll => Some(controller.cancel_all().await),
        OperatorCommand::SetTicker(symbol) => {
            if let Err(err) = controller.select_instrument(&symbol).await {
                eprintln!("{err}");
            }
            None
        }
        OperatorCommand::SetQuantity(v) => {
            controller.edit_config(|config| config.quantity = v).await;
            None
        }
        OperatorCommand::SetSpread(v) => {
            controller.edit_config(|config| config.spread = v).await;
            None
        }
        OperatorCommand::SetInterval(v) => {
            controller.edit_config(|config| config.interval = v).await;
            None
        }
        OperatorCommand::SetBoost(v) => {
            controller.edit_config(|config| config.boost_mode = v).await;
            None
        }
        OperatorCommand::SetMaxExposure(v) => {
            controller.edit_config(|config| config.max_exposure = v).await;
            None
        }
        OperatorCommand::SetTarget(v) => {
            if let Err(err) = controller.set_planner_target(v).await {
                eprintln!("{err}");
            }
            None
        }
        OperatorCommand::TogglePlanner => {
            let active = controller.toggle_planner().await;
            println!("planner {}", if active { "on" } else { "off" });
            None
        }
        OperatorCommand::RefreshPrice => {
            if controller.refresh_price().await.is_none() {
                eprintln!("price unavailable");
            }
            None
        }
        OperatorCommand::Account => {
            match controller.account().await {
                Ok(detail) => println!("{}", render::account(&detail)),
                Err(err) => eprintln!("{err}"),
            }
            None
        }
        OperatorCommand::View => None,
        OperatorCommand::Help => {
            println!("{}", commands::HELP);
            return;
        }
        OperatorCommand::Quit => return,
    };

    match result {
        Some(Ok(outcome)) => println!("--> {}", render::outcome(&outcome)),
        Some(Err(err)) => eprintln!("{err}"),
        None => println!("{}", render::view(&controller.view().await)),
    }
}
