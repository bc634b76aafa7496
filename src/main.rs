use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::info;
use smartwake::alarm::TerminalBell;
use smartwake::audit::{AuditLog, FileAuditLog};
use smartwake::config::{Args, Command};
use smartwake::episode::Episode;
use smartwake::file_store::JsonFileStore;
use smartwake::monitor::SleepMonitor;
use smartwake::output::render_night;
use smartwake::preferences::JsonPreferences;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let store = Arc::new(JsonFileStore::open(&args.store));
    let audit = Arc::new(FileAuditLog::new(&args.log_file));
    let monitor = SleepMonitor::new(
        store.clone(),
        Arc::new(JsonPreferences::new(&args.preferences)),
        audit.clone(),
        Arc::new(TerminalBell::default()),
    );

    match args.command {
        Command::Monitor => {
            let watcher = Arc::clone(&store).watch(args.watch_every());
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Could not listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Shutting down");
            };
            monitor.run(args.poll_every(), shutdown).await;
            watcher.abort();
        }
        Command::Status => {
            let mut monitor = monitor;
            println!("{}", monitor.status_report(&Local::now()));
        }
        Command::Night { skip, json } => {
            let episode = Episode::most_recent(store.as_ref(), skip)
                .with_context(|| format!("No sleep episode {} nights back", skip))?;
            print!("{}", render_night(&episode, json)?);
        }
        Command::Log => print!("{}", audit.read_text()?),
        Command::ClearLog => audit.clear()?,
        Command::PlayAlarm => {
            monitor.play_alarm(true);
        }
    }

    Ok(())
}
