use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};

use ordertracker::auth::AuthSession;
use ordertracker::config::Config;
use ordertracker::email::{ExtractionQuery, ExtractionRun, MailSource, OrderEmailProcessor};
use ordertracker::error::MailError;
use ordertracker::extract::{FieldExtractors, OrderStatus, PatternTable};
use ordertracker::gmail_client::GmailClient;
use ordertracker::mailbox_dir::MailboxDir;
use ordertracker::records::{OrderTable, SortKey};

#[derive(Parser)]
#[command(name = "ordertracker")]
#[command(about = "Extract order tracking details (order ID, tracking number, status, delivery date) from Gmail")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in to Gmail (runs the consent flow if no valid session is stored)
    Auth,
    /// Forget the stored session of the configured account
    Disconnect,
    /// Search order emails and print the extracted table
    Extract(ExtractArgs),
    /// Check configuration without connecting
    CheckConfig,
}

#[derive(Args)]
struct ExtractArgs {
    /// Number of days to look back (default: EXTRACT_DAYS_BACK)
    #[arg(short = 'd', long)]
    days_back: Option<u32>,

    /// Maximum number of emails to process (default: EXTRACT_MAX_EMAILS)
    #[arg(short = 'l', long)]
    max_emails: Option<usize>,

    /// Only show these sellers (address or name, repeatable)
    #[arg(long)]
    seller: Vec<String>,

    /// Only show these statuses (repeatable)
    #[arg(long)]
    status: Vec<OrderStatus>,

    /// Sort column: received, delivery-date, seller, order-id, status
    #[arg(long, default_value = "received")]
    sort_by: SortKey,

    /// Also write the table to this CSV file
    #[arg(long)]
    csv: Option<String>,

    /// Read exported messages from a directory instead of Gmail
    #[arg(long)]
    mailbox_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    env_logger::init();

    let config = Config::new()?;

    match cli.command {
        Command::Auth => authenticate(&config).await,
        Command::Disconnect => disconnect(&config),
        Command::Extract(args) => extract(&config, args).await,
        Command::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

async fn authenticate(config: &Config) -> Result<()> {
    let session = AuthSession::load(&config.gmail, config.credentials_path()?).await?;
    if !session.has_stored_session() {
        info!("No stored session for '{}', starting the consent flow", session.account());
    }
    match session.refresh().await {
        Ok(()) => {
            println!("✅ Signed in to Gmail (account '{}')", session.account());
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            anyhow::bail!("Gmail authentication failed, run `ordertracker auth` again")
        }
    }
}

fn disconnect(config: &Config) -> Result<()> {
    if AuthSession::forget(&config.gmail)? {
        println!("✅ Session for '{}' removed", config.gmail.account);
    } else {
        println!("ℹ️  No stored session for '{}'", config.gmail.account);
    }
    Ok(())
}

fn check_config(config: &Config) {
    println!("✅ Configuration valid!");
    println!("📧 Gmail API OAuth2");
    match &config.gmail.credentials_path {
        Some(path) => println!("🔑 Credentials: {}", path),
        None => println!("🔑 Credentials: (not set, only --mailbox-dir is available)"),
    }
    println!("💾 Token cache: {}", config.gmail.token_cache_path);
    println!("👤 Account: {}", config.gmail.account);
    println!(
        "📋 Patterns: {}",
        config.extraction.patterns_path.as_deref().unwrap_or("built-in")
    );
    println!(
        "🔍 Window: {} day(s), at most {} email(s)",
        config.extraction.days_back, config.extraction.max_emails
    );
    println!(
        "🔁 Fetch retries: {} (initial backoff {} ms)",
        config.fetch.max_retries, config.fetch.initial_backoff_ms
    );
}

async fn extract(config: &Config, args: ExtractArgs) -> Result<()> {
    let table = PatternTable::load(config.extraction.patterns_path.as_deref())?;
    let extractors = FieldExtractors::new(&table).context("Unable to build field extractors")?;

    let query = ExtractionQuery::order_emails(
        Local::now().date_naive(),
        args.days_back.unwrap_or(config.extraction.days_back),
        args.max_emails.unwrap_or(config.extraction.max_emails),
    );

    let run = match &args.mailbox_dir {
        Some(dir) => run_extraction(MailboxDir::new(dir), extractors, config, &query).await?,
        None => {
            let session = AuthSession::load(&config.gmail, config.credentials_path()?).await?;
            let client = GmailClient::new(&session).context("Unable to connect to Gmail API")?;
            let result = run_extraction(client, extractors, config, &query).await;

            let rejected = match &result {
                Ok(run) => run.needs_reauthentication(),
                Err(e) => matches!(e.downcast_ref::<MailError>(), Some(MailError::Auth(_))),
            };
            if rejected {
                warn!("⚠️  Gmail rejected the session for '{}'", session.account());
                session.invalidate()?;
            }
            result?
        }
    };

    let mut view = run.table.filter(&args.seller, &args.status);
    view.sort_by(args.sort_by);

    print_table(&view);
    print_summary(&view, &run);

    if let Some(path) = &args.csv {
        view.export_csv(path)?;
    }

    if run.needs_reauthentication() {
        println!("\n🔐 Your Gmail session is no longer valid. Run `ordertracker auth` to sign in again.");
    }

    Ok(())
}

async fn run_extraction<S: MailSource>(
    source: S,
    extractors: FieldExtractors,
    config: &Config,
    query: &ExtractionQuery,
) -> Result<ExtractionRun> {
    let processor = OrderEmailProcessor::new(source, extractors, config.fetch.clone())?;
    match processor.run(query).await {
        Ok(run) => Ok(run),
        Err(e) => {
            error!("❌ Error searching for emails: {}", e);
            Err(e).context("Extraction failed")
        }
    }
}

fn print_table(table: &OrderTable) {
    if table.is_empty() {
        println!("❌ No order emails found");
        return;
    }

    println!(
        "\n{:<12} {:<22} {:<22} {:<12} {:<17} {:<20} {}",
        "Received", "Order ID", "Tracking", "Delivery", "Status", "Seller", "Subject"
    );
    println!("{}", "=".repeat(130));

    for r in table.records() {
        println!(
            "{:<12} {:<22} {:<22} {:<12} {:<17} {:<20} {}",
            r.received.format("%Y-%m-%d").to_string(),
            r.order_id.as_deref().unwrap_or("-"),
            r.tracking_number.as_deref().unwrap_or("-"),
            r.delivery_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            r.status.as_str(),
            truncate(&r.seller_name, 20),
            truncate(&r.subject, 60),
        );
    }
}

fn print_summary(table: &OrderTable, run: &ExtractionRun) {
    let summary = table.summary();
    println!("{}", "=".repeat(130));
    println!(
        "📊 {} order(s) | {} seller(s) | {} delivered | {} pending | {} cancelled",
        summary.total, summary.unique_sellers, summary.delivered, summary.pending, summary.cancelled
    );

    if run.is_partial() {
        println!(
            "⚠️  {} of {} email(s) skipped:",
            run.skipped.len(),
            run.candidates
        );
        for skipped in &run.skipped {
            println!("   - {}: {}", skipped.message_id, skipped.error);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
