use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use chargeq::config::Config;
use chargeq::daemon::{self, TickConfig};
use chargeq::domain::{PileStatus, RequestStatus};
use chargeq::notify::{ChannelNotifier, Delivery, LogNotifier, MemoryNotifier, Notifier, Outbound};
use chargeq::station::{ChargingResponse, QueueLocation};
use chargeq::{Station, StationError};
use cli::Cli;
use cli::commands::{Commands, PileCommands, UserCommands};

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chargeq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("chargeq.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_station(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Station> {
    let store_dir = &config.storage.store_dir;
    fs::create_dir_all(store_dir).context(format!("Failed to create store directory {}", store_dir.display()))?;
    Station::open(store_dir, config, notifier).context(format!("Failed to open station store in {}", store_dir.display()))
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Daemon => handle_daemon_command(config),
        Commands::Tick => handle_tick_command(config),
        Commands::Config => handle_config_command(config),
        command => {
            let station = open_station(config, Arc::new(LogNotifier))?;
            match command {
                Commands::User { command } => handle_user_command(&station, command),
                Commands::Submit { user, mode, amount } => {
                    respond(station.submit(user, (*mode).into(), *amount))
                }
                Commands::Modify { user, mode, amount } => {
                    respond(station.modify(user, (*mode).into(), *amount))
                }
                Commands::Start { user } => respond(station.start(user)),
                Commands::Stop { user } => respond(station.stop(user)),
                Commands::Cancel { user } => respond(station.cancel(user)),
                Commands::Status { user } => handle_status_command(&station, user),
                Commands::Queue { user } => handle_queue_command(&station, user),
                Commands::Bills { user } => handle_bills_command(&station, user),
                Commands::Pile { command } => handle_pile_command(&station, command),
                Commands::Daemon | Commands::Tick | Commands::Config => Ok(()),
            }
        }
    }
}

/// Print a lifecycle response; rejections are shown, not treated as failures
fn respond(result: chargeq::Result<ChargingResponse>) -> Result<()> {
    match result {
        Ok(response) => {
            println!(
                "{} {} [{}] {}",
                "OK".green(),
                response.request_id.bold(),
                response.status,
                response.message
            );
            Ok(())
        }
        Err(e) if e.is_rejection() => {
            println!("{} {}", "Rejected:".red(), e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_daemon_command(config: &Config) -> Result<()> {
    let (notifier, deliveries) = ChannelNotifier::new();
    let station = Arc::new(open_station(config, Arc::new(notifier))?);
    let tick = TickConfig::from(&config.daemon);

    println!(
        "{} scheduler every {:?}, monitor every {:?} ({})",
        "Daemon running:".cyan(),
        tick.scheduler_interval,
        tick.monitor_interval,
        config.station.schedule_strategy
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let state = runtime
        .block_on(daemon::run(station, tick, Some(deliveries)))
        .context("Daemon failed")?;
    println!("{} {}", "Daemon stopped:".cyan(), state.summary());
    Ok(())
}

fn handle_tick_command(config: &Config) -> Result<()> {
    let notifier = Arc::new(MemoryNotifier::new());
    let station = open_station(config, notifier.clone())?;

    let monitor = station.monitor_tick().context("Monitor pass failed")?;
    for action in &monitor.actions {
        println!("{} {:?}", "monitor".yellow(), action);
    }
    for id in &monitor.completed {
        println!("{} {} completed", "monitor".yellow(), id);
    }

    let report = station.schedule().context("Scheduling tick failed")?;
    println!(
        "{} {} assigned ({})",
        "schedule".cyan(),
        report.assignments.len(),
        report.strategy
    );
    for assignment in &report.assignments {
        let tag = if assignment.priority { " priority" } else { "" };
        println!(
            "  {} -> {} #{}{}",
            assignment.request_id, assignment.pile_id, assignment.position, tag
        );
    }
    if report.priority_unplaced > 0 {
        println!(
            "  {} priority request(s) still waiting",
            report.priority_unplaced.to_string().yellow()
        );
    }

    for Delivery { user_id, message } in notifier.take() {
        if let Outbound::Notice(notice) = message {
            println!("{} {} {}: {}", "notify".magenta(), user_id, notice.kind, notice.message);
        }
    }
    Ok(())
}

fn handle_config_command(config: &Config) -> Result<()> {
    for key in chargeq::config::StationConfig::keys() {
        if let Some(value) = config.station.get(key) {
            println!("{:<24} {}", key.cyan(), value);
        }
    }
    println!("{:<24} {}", "store_dir".cyan(), config.storage.store_dir.display());
    Ok(())
}

fn handle_user_command(station: &Station, command: &UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { id, name, battery } => {
            match station.register_user(id, name.as_deref().unwrap_or(id), *battery) {
                Ok(user) => println!("{} {} ({:.1} kWh)", "Registered".green(), user.id.bold(), user.battery_capacity),
                Err(e) if e.is_rejection() => println!("{} {}", "Rejected:".red(), e),
                Err(e) => return Err(e.into()),
            }
        }
        UserCommands::Show { id } => {
            let user = station.user(id)?;
            println!("{} {} ({})", "User".green(), user.id.bold(), user.name);
            println!("  battery: {:.2} / {:.2} kWh", user.current_charge, user.battery_capacity);
            match station.charging_status(id)? {
                Some(status) => println!("  request: {} [{}] {:.2} kWh", status.request_id, status.status, status.requested),
                None => println!("  request: none"),
            }
        }
    }
    Ok(())
}

fn handle_status_command(station: &Station, user: &str) -> Result<()> {
    let Some(status) = station.charging_status(user)? else {
        println!("{} no active request", user.bold());
        return Ok(());
    };
    let label = match status.status {
        RequestStatus::Charging => status.status.to_string().green(),
        RequestStatus::PriorityWaiting => status.status.to_string().yellow(),
        _ => status.status.to_string().normal(),
    };
    println!("{} {} [{}] {}", user.bold(), status.request_id, label, status.mode);
    println!("  requested: {:.2} kWh, delivered: {:.2} kWh", status.requested, status.delivered);
    println!("  battery:   {:.2} / {:.2} kWh", status.current_charge, status.battery_capacity);
    if let Some(pile) = &status.pile_id {
        println!("  pile:      {} #{}", pile, status.queue_position.unwrap_or(0));
    }
    if status.status == RequestStatus::Charging {
        println!("  remaining: {} min", status.remaining_minutes);
        println!(
            "  fee so far: {:.2} (estimated total {:.2})",
            status.current_fee.total, status.estimated_fee.total
        );
    }
    Ok(())
}

fn handle_queue_command(station: &Station, user: &str) -> Result<()> {
    let status = station.queue_status(user)?;
    match status.location {
        QueueLocation::None => println!("{} not in line", user.bold()),
        QueueLocation::WaitingArea => println!(
            "{} {} in waiting area, {} ahead, ~{} min",
            user.bold(),
            status.queue_number.unwrap_or_default(),
            status.ahead,
            status.estimated_wait_minutes
        ),
        QueueLocation::ChargingPile => println!(
            "{} {} at pile {}, {} ahead, ~{} min",
            user.bold(),
            status.queue_number.unwrap_or_default(),
            status.pile_id.unwrap_or_default(),
            status.ahead,
            status.estimated_wait_minutes
        ),
    }
    Ok(())
}

fn handle_bills_command(station: &Station, user: &str) -> Result<()> {
    let bills = station.bills(user)?;
    if bills.is_empty() {
        println!("{} no bills", user.bold());
    }
    for bill in bills {
        println!(
            "{} {} {} {:.2} kWh {} min  charge {:.2} + service {:.2} = {}",
            bill.number.bold(),
            bill.request_id,
            bill.pile_id,
            bill.charged_amount,
            bill.duration_minutes,
            bill.charging_fee,
            bill.service_fee,
            format!("{:.2}", bill.total_fee).green()
        );
    }
    Ok(())
}

fn handle_pile_command(station: &Station, command: &PileCommands) -> Result<()> {
    match command {
        PileCommands::Add { pile_type, power } => {
            let pile = station.add_pile((*pile_type).into(), *power)?;
            println!("{} {} ({} {} kW)", "Added".green(), pile.id.bold(), pile.pile_type, pile.power);
        }
        PileCommands::List => {
            for overview in station.pile_overview()? {
                let status = match overview.pile.status {
                    PileStatus::Available => overview.pile.status.to_string().green(),
                    PileStatus::Charging => overview.pile.status.to_string().cyan(),
                    PileStatus::Unavailable => overview.pile.status.to_string().red(),
                };
                println!(
                    "{} {:<5} {:>5} kW {:<12} queue {} wait {} min  charges {} energy {:.2} kWh revenue {:.2}",
                    overview.pile.id.bold(),
                    overview.pile.pile_type,
                    overview.pile.power,
                    status,
                    overview.queue_length,
                    overview.waiting_minutes,
                    overview.charges,
                    overview.energy,
                    overview.revenue
                );
            }
        }
        PileCommands::Toggle { id } => {
            let (pile, actions) = station.toggle_pile(id)?;
            println!("{} {} is {}", "Pile".green(), pile.id.bold(), pile.status);
            for action in actions {
                println!("  {:?}", action);
            }
        }
        PileCommands::Set { id, status } => {
            let (pile, actions) = station.set_pile_status(id, (*status).into())?;
            println!("{} {} is {}", "Pile".green(), pile.id.bold(), pile.status);
            for action in actions {
                println!("  {:?}", action);
            }
        }
        PileCommands::Queue { id } => {
            let entries = station.pile_queue(id)?;
            if entries.is_empty() {
                println!("{} empty", id.bold());
            }
            for entry in entries {
                println!(
                    "#{} {} {} [{}] {:.2} kWh, waited {} min",
                    entry.position, entry.request_id, entry.user_id, entry.status, entry.amount, entry.waited_minutes
                );
            }
        }
        PileCommands::Remove { id } => match station.remove_pile(id) {
            Ok(()) => println!("{} {}", "Removed".green(), id.bold()),
            Err(e @ StationError::Precondition(_)) => println!("{} {}", "Rejected:".red(), e),
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
