use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rebooker::availability::AvailabilityQuery;
use rebooker::client::{SchedulingApi, VisaClient};
use rebooker::config::BotConfig;
use rebooker::logging::init_tracing;
use rebooker::policy::DateBounds;
use rebooker::poller::{LoopExit, LoopSettings, PollState, PollingLoop};
use rebooker::types::AppointmentDate;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "rebooker-cli")]
#[command(about = "Watch the scheduling site for an earlier appointment and rebook onto it")]
#[command(
    long_about = "Runs the rebooking loop in the foreground, or queries the site once.\n\n\
    Site credentials and identifiers are read from the environment (or a .env file):\n\
    EMAIL, PASSWORD, COUNTRY_CODE, SCHEDULE_ID and FACILITY_ID."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for earlier dates and book them as they appear
    ///
    /// Exits once a date on or before the target date is booked, or on Ctrl-C.
    Run {
        /// The appointment date currently held (YYYY-MM-DD)
        #[arg(short, long, value_name = "DATE")]
        current: AppointmentDate,

        /// Stop after booking a date on or before this one
        #[arg(short, long, value_name = "DATE")]
        target: Option<AppointmentDate>,

        /// Ignore openings earlier than this date
        #[arg(short, long, value_name = "DATE")]
        min: Option<AppointmentDate>,

        /// Log what would be booked without submitting anything
        #[arg(long)]
        dry_run: bool,

        /// Seconds between checks; overrides REFRESH_DELAY
        #[arg(short, long, value_name = "SECS")]
        refresh_delay: Option<u64>,
    },

    /// Log in once and print the available dates
    Dates,

    /// Log in once and print the preferred open time for a date
    Times {
        /// The date to inspect (YYYY-MM-DD)
        date: AppointmentDate,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = BotConfig::from_env().context("Invalid configuration")?;
    init_tracing(config.log_json, None);

    let client = VisaClient::new(config.base_url.clone(), config.client_options())
        .context("Failed to build HTTP client")?;

    match cli.command {
        Commands::Run {
            current,
            target,
            min,
            dry_run,
            refresh_delay,
        } => {
            let mut settings = LoopSettings::from_config(&config);
            if let Some(secs) = refresh_delay {
                settings.refresh_delay = Duration::from_secs(secs);
            }
            let state = PollState {
                held: current,
                bounds: DateBounds {
                    min_date: min,
                    target_date: target,
                },
                dry_run,
            };
            run_loop(client, settings, state).await
        }
        Commands::Dates => {
            let session = client.login(&config.credentials).await?;
            let dates = AvailabilityQuery::new(&client, &config.target)
                .list_dates(&session)
                .await?;
            if dates.is_empty() {
                println!("No dates available.");
            } else {
                for date in &dates {
                    println!("{}", date);
                }
                println!("{} date(s) for facility {}", dates.len(), config.target.facility_id);
            }
            Ok(())
        }
        Commands::Times { date } => {
            let session = client.login(&config.credentials).await?;
            let time = AvailabilityQuery::new(&client, &config.target)
                .list_time(&session, date)
                .await?;
            match time {
                Some(time) => println!("{} {}", date, time),
                None => println!("No open times on {}.", date),
            }
            Ok(())
        }
    }
}

async fn run_loop(
    client: VisaClient,
    settings: LoopSettings,
    state: PollState,
) -> anyhow::Result<()> {
    let (polling, _snapshots) = PollingLoop::new(Arc::new(client), settings, state);
    let (stop, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current step");
            stop.send_replace(true);
        }
        // Keep the sender alive so the loop only stops on request
        std::future::pending::<()>().await;
    });

    match polling.run(stop_rx).await {
        LoopExit::TargetReached(date) => println!("Booked {}, target reached.", date),
        LoopExit::Stopped => println!("Stopped."),
    }
    Ok(())
}
