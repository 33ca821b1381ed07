// Trailsafe Backup Scheduler
// Runs a periodic backup whenever the configured interval has elapsed

use anyhow::{Context, Result};
use chrono::Local;
use std::thread;
use std::time::Duration;
use trailsafe::{BackupSettings, PeriodicBackupRunner};
use trailsafe_common::{BackupEvent, TrailsafeConfig, describe_interval, format_duration_ms};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("================================================");
    log::info!("Trailsafe Backup Scheduler Starting");
    log::info!("================================================");

    let (runner, check_interval) = loop {
        match start_scheduler() {
            Ok(started) => break started,
            Err(e) => {
                log::error!("Scheduler error: {:#}", e);
                log::info!("Will retry in 60 seconds...");
                thread::sleep(Duration::from_secs(60));
            }
        }
    };
    let settings = BackupSettings::new(runner.gate().clone());

    // Main service loop
    loop {
        run_scheduler_loop(&runner, &settings);
        thread::sleep(check_interval);
    }
}

/// Load the configuration and wire up the runner shared by every tick
fn start_scheduler() -> Result<(PeriodicBackupRunner, Duration)> {
    let config = TrailsafeConfig::new().context("Failed to load configuration")?;
    let runner = PeriodicBackupRunner::from_config(&config)?;
    Ok((runner, Duration::from_secs(config.check_interval_seconds)))
}

/// One scheduler tick
fn run_scheduler_loop(runner: &PeriodicBackupRunner, settings: &BackupSettings) {
    let gate = runner.gate();
    let first_check = !gate.is_already_checked();

    let interval_ms = gate.interval_ms();
    if interval_ms <= 0 {
        log::debug!("Periodic backups are off");
        return;
    }

    if !runner.is_time_to_backup() {
        let remaining = gate.remaining_ms(Local::now().timestamp_millis());
        if first_check {
            log::info!(
                "Next backup in {} ({})",
                format_duration_ms(remaining),
                describe_interval(interval_ms)
            );
        } else {
            log::debug!("Next backup in {}", format_duration_ms(remaining));
        }
        return;
    }

    log::info!("Periodic backup due ({})", describe_interval(interval_ms));
    match runner.do_backup() {
        Some(BackupEvent::Finished) => log::info!("{}", settings.status_summary()),
        Some(BackupEvent::Failed(kind)) => log::warn!("{}", kind.user_message()),
        Some(BackupEvent::Started) => {}
        None => log::warn!("Backup due, but no backup folder is available. Will check again later"),
    }
}
