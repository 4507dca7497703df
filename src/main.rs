use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use teetime::advice::AdviceClient;
use teetime::config::{ConfigError, Settings};
use teetime::dashboard::state::DashboardState;
use teetime::error::BookingError;
use teetime::outcome::{self, OutcomeLog};
use teetime::workflow::date::format_date;
use teetime::workflow::{self, RunReport};

#[derive(Parser)]
#[command(
    name = "teetime",
    about = "Unattended tee-time booking for a members' golf portal",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Defaults to $TEETIME_CONFIG, then ./teetime.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the booking log location
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one booking attempt (needs CCJ_USER, CCJ_PASS and a WebDriver endpoint)
    Book,

    /// Show recorded booking outcomes, newest first
    Status {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Ask the caddie for a note on a course and day
    Advice {
        /// Course name (defaults to the first configured course)
        #[arg(long)]
        course: Option<String>,

        /// Day descriptor (defaults to the next target date)
        #[arg(long)]
        date: Option<String>,
    },

    /// Serve the read-only dashboard API
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Preview upcoming invocations of the booking cadence
    Schedule {
        /// Cron expression (seconds first); defaults to the configured cadence
        #[arg(long)]
        cron: Option<String>,

        /// Number of runs to list
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut settings = match Settings::discover(cli.config.as_deref()) {
        Ok(settings) => settings,
        // A booking run that cannot read its settings still records its outcome.
        Err(e) if matches!(cli.command, Commands::Book) => {
            let log_path = cli.log_file.unwrap_or_else(|| Settings::default().log_path);
            let fatal = BookingError::Config(ConfigError::File(e));
            let report = workflow::record_fatal(&OutcomeLog::new(log_path), fatal)?;
            return finish(report);
        }
        Err(e) => return Err(e),
    };
    if let Some(path) = cli.log_file {
        settings.log_path = path;
    }

    match cli.command {
        Commands::Book => {
            tracing::info!(site = %settings.target_site, courses = ?settings.courses, "Starting booking run");
            let notify = settings.notify_email.clone();
            let report = teetime::book(settings).await?;

            if let Some(recipient) = notify {
                let advice = AdviceClient::from_env();
                let text = advice
                    .notification_text(&report.entry.status.to_string(), &report.entry.details)
                    .await;
                tracing::info!(%recipient, "notification prepared");
                println!("--- Notification for {} ---\n{}\n", recipient, text);
            }

            return finish(report);
        }
        Commands::Status { json } => {
            let entries = outcome::read_entries(&settings.log_path);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No booking runs recorded yet.");
            } else {
                println!("{:<25} | {:<9} | Details", "Timestamp", "Status");
                println!("{:-<25}-|-{:-<9}-|-{:-<40}", "", "", "");
                for entry in &entries {
                    println!(
                        "{:<25} | {:<9} | {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                        entry.status.to_string(),
                        entry.details
                    );
                }
            }
        }
        Commands::Advice { course, date } => {
            let course = course
                .or_else(|| settings.courses.first().cloned())
                .unwrap_or_default();
            let date = date.unwrap_or_else(|| {
                let today = chrono::Local::now().date_naive();
                format_date(settings.target_date.target_date(today))
            });
            let text = AdviceClient::from_env().caddie_advice(&course, &date).await;
            println!("Caddie's note for {} on {}:\n{}", course, date, text);
        }
        Commands::Serve { bind } => {
            tracing::info!(%bind, log = %settings.log_path.display(), "Starting dashboard");
            let state = DashboardState::new(settings, AdviceClient::from_env());
            teetime::dashboard::serve(&bind, state).await?;
        }
        Commands::Schedule { cron, count } => {
            let expr = cron.unwrap_or_else(|| settings.schedule.clone());
            let runs = teetime::schedule::upcoming(&expr, chrono::Utc::now(), count)?;
            println!("Upcoming runs for '{}':", expr);
            for run in runs {
                println!(
                    " - {} (local {})",
                    run.to_rfc3339(),
                    run.with_timezone(&chrono::Local).format("%a %Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}

/// Print the outcome of a booking run and turn an aborted run into an error.
fn finish(report: RunReport) -> Result<()> {
    println!("{}: {}", report.entry.status, report.entry.details);
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }

    // "No slot found" is a normal run; only an aborted run exits non-zero.
    match report.fatal {
        Some(fatal) => Err(anyhow::Error::new(fatal).context("booking run aborted")),
        None => Ok(()),
    }
}

/// Logs go to stderr so stdout stays parseable (`status --json`).
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
