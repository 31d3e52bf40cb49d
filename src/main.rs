use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use mm_tracker::db::{self, User};
use mm_tracker::email::LogMailer;
use mm_tracker::import::load_csv;
use mm_tracker::log::init_logging;
use mm_tracker::{AppConfig, Period, RecordKind, Services, SystemClock, Tracker, DEFAULT_FEED_LIMIT};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Show income, expense and savings for a month
    Summary {
        #[arg(long)]
        email: String,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show the most recent expenses and incomes
    Recent {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: i64,
    },
    /// Import expenses or incomes from a CSV file
    Import {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        kind: KindArg,
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Expense,
    Income,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> RecordKind {
        match kind {
            KindArg::Expense => RecordKind::Expense,
            KindArg::Income => RecordKind::Income,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(command) => run(command, cli.config_path.as_deref()),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn run(command: Commands, config_path: Option<&str>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("Failed to open database: {}", config.database.path))?;
    db::setup_database(&conn)?;

    let mailer = LogMailer::new(&config.email.frontend_url);
    let services = Services::new(config, Arc::new(SystemClock), Arc::new(mailer))?;
    let tracker = Tracker::new(&conn, &services);

    match command {
        Commands::Init => {
            info!(path = %services.config.database.path, "Database initialized");
        }
        Commands::Summary { email, month, year } => {
            let user = find_user(&conn, &email)?;
            let period = Period::resolve(month, year, services.clock.as_ref())?;
            let summary = tracker.summary_for(&user, period)?;
            let symbol = summary.currency.symbol();

            println!("{} {:02}/{}", user.name, period.month, period.year);
            println!("  Income:   {}{:.2}", symbol, summary.total_income);
            println!("  Expenses: {}{:.2}", symbol, summary.total_expense);
            println!("  Savings:  {}{:.2}", symbol, summary.savings);
        }
        Commands::Recent { email, limit } => {
            let user = find_user(&conn, &email)?;
            let feed = tracker.recent_activity_for(&user, limit)?;

            if feed.is_empty() {
                println!("No activity yet");
            }
            for entry in feed {
                println!(
                    "{}  {:<8} {:<20} {}{:.2}",
                    entry.occurred_on,
                    entry.kind.name(),
                    entry.label,
                    entry.currency.symbol(),
                    entry.amount
                );
            }
        }
        Commands::Import { email, kind, file } => {
            let user = find_user(&conn, &email)?;
            let kind = RecordKind::from(kind);
            let inputs = load_csv(&file, kind)?;
            let count = tracker.import_records_for(&user, kind, inputs)?;
            println!("Imported {} {} records from {}", count, kind.name(), file.display());
        }
    }

    Ok(())
}

fn find_user(conn: &Connection, email: &str) -> Result<User> {
    db::find_user_by_email(conn, email)?.with_context(|| format!("No user registered as {}", email))
}
