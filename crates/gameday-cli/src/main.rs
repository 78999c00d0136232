use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gameday_sync::{build_runtime, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "gameday-cli")]
#[command(about = "Gameday schedule sync command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one full reconciliation now.
    Sync,
    /// Promote games whose scheduled window has elapsed.
    Sweep,
    /// Show the last sync outcome and recent field updates.
    Status,
    /// Run the scheduler daemon (daily sync, hourly sweep) until interrupted.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();
    let scheduler = build_runtime(&config).await?;

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let result = scheduler.trigger_manual_sync().await;
            println!(
                "sync complete: added={} updated={} errors={}",
                result.added,
                result.updated,
                result.errors.len()
            );
            for error in &result.errors {
                eprintln!("  {error}");
            }
        }
        Commands::Sweep => {
            let promoted = scheduler.sweep_now().await;
            println!("sweep complete: promoted={promoted}");
        }
        Commands::Status => {
            let status = scheduler.get_last_sync_status().await?;
            match status.last_sync {
                Some(at) => println!("last sync: {at}"),
                None => println!("last sync: never"),
            }
            println!("next scheduled: {}", status.next_scheduled);
            for update in &status.recent_updates {
                println!(
                    "  {}: {} -> {} ({})",
                    update.field,
                    update.old_value.as_deref().unwrap_or("-"),
                    update.new_value,
                    update.source
                );
            }
        }
        Commands::Run => {
            let cron = scheduler.build_cron().await?;
            cron.start().await.context("starting scheduler")?;
            println!("scheduler running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        }
    }

    Ok(())
}
