// Trailsafe command line: manage the backup location and run backups

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trailsafe::{
    BackupSettings, BackupStore, DocumentHandle, LocalDocument, LocationStatus, PeriodicBackupRunner,
};
use trailsafe_common::settings::parse_interval;
use trailsafe_common::{BackupEvent, TrailsafeConfig, describe_interval, format_duration_ms, naming};

#[derive(Parser, Debug)]
#[command(name = "trailsafe", version, about = "Back up bookmarks into a local folder")]
struct Cli {
    /// Configuration file (default: ~/.config/trailsafe/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the backup location, schedule and last backup
    Status,
    /// Back up now, regardless of the schedule
    Backup,
    /// List the backups in the backup location
    List,
    /// Use a directory as the backup location and back up into it
    SetLocation { dir: PathBuf },
    /// Forget the backup location
    ClearLocation,
    /// Set the periodic interval: off, daily, weekly, monthly or milliseconds
    SetInterval {
        #[arg(value_parser = parse_interval)]
        interval: i64,
    },
    /// Set how many backups are kept
    SetMax {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },
    /// Back up only if the periodic interval has elapsed
    Check,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TrailsafeConfig::from_file(path)?,
        None => TrailsafeConfig::new()?,
    };
    let runner = PeriodicBackupRunner::from_config(&config)?;
    let settings = BackupSettings::new(runner.gate().clone());

    match cli.command {
        Command::Status => print_status(&settings, &runner),
        Command::Backup => report(settings.run_backup(&runner)?)?,
        Command::List => list_backups(&settings)?,
        Command::SetLocation { dir } => {
            let (dir, outcome) = settings.choose_location(&dir, &runner)?;
            println!("Backups will be saved to {}", dir.display());
            report(outcome)?;
        }
        Command::ClearLocation => {
            settings.clear_location()?;
            println!("Backup location cleared");
        }
        Command::SetInterval { interval } => {
            settings.set_interval(interval)?;
            println!("Periodic backups: {}", describe_interval(interval));
        }
        Command::SetMax { count } => {
            settings.set_max_backups(count)?;
            println!("Keeping up to {} backups", count);
        }
        Command::Check => {
            if runner.is_time_to_backup() {
                let outcome = runner
                    .do_backup()
                    .context("Backup location is not available")?;
                report(outcome)?;
            } else {
                println!("No backup due");
            }
        }
    }
    Ok(())
}

fn report(outcome: BackupEvent) -> Result<()> {
    match outcome {
        BackupEvent::Failed(kind) if kind.is_fault() => anyhow::bail!(kind.user_message()),
        BackupEvent::Failed(kind) => println!("{}", kind.user_message()),
        _ => println!("Backup complete"),
    }
    Ok(())
}

fn print_status(settings: &BackupSettings, runner: &PeriodicBackupRunner) {
    let gate = runner.gate();

    match settings.location_status() {
        LocationStatus::NotConfigured => println!("Location: not configured"),
        LocationStatus::Unavailable(path) => println!("Location: {} (unavailable)", path),
        LocationStatus::Ready(path) => println!("Location: {}", path),
    }
    println!("Interval: {}", describe_interval(gate.interval_ms()));
    println!("Keeping:  {} backups", gate.max_backups());
    println!("{}", settings.status_summary());

    let interval_ms = gate.interval_ms();
    if interval_ms > 0 && gate.last_backup_time_ms() > 0 {
        let next = gate.remaining_ms(chrono::Local::now().timestamp_millis());
        if next > 0 {
            println!("Next backup in {}", format_duration_ms(next));
        } else {
            println!("Next backup: due now");
        }
    }
}

fn list_backups(settings: &BackupSettings) -> Result<()> {
    let path = match settings.location_status() {
        LocationStatus::Ready(path) | LocationStatus::Unavailable(path) => path,
        LocationStatus::NotConfigured => anyhow::bail!("No backup folder is configured"),
    };
    let root = LocalDocument::open(&path)
        .with_context(|| format!("Backup folder {} is not available", path))?;

    let backups = BackupStore::list_backups(&root)
        .with_context(|| format!("Failed to list backups in {}", path))?;
    if backups.is_empty() {
        println!("No backups in {}", path);
        return Ok(());
    }

    for backup in backups {
        let name = backup.name().unwrap_or_default();
        match naming::parse_timestamp(&name) {
            Some(time) => println!("{}  {}", time.format("%Y-%m-%d %H:%M:%S"), backup.uri()),
            None => println!("{:19}  {}", "?", backup.uri()),
        }
    }
    Ok(())
}
