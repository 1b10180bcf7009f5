use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use csv::Writer;
use listwatch_core::{
    create_query_table, open_store, ChangeDetector, ExtractionOutcome, ListingSource, LogNotifier, Notifier,
    OwnerId, PollCycle, QueryId, RecordDisplay, Registry, StdoutNotifier, TelegramNotifier, WatchConfig,
    DEFAULT_LABEL,
};
use listwatch_scrapers::MarketplaceScraper;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Listings shown when previewing a search.
const PREVIEW_LEN: usize = 3;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Registry file: `.json` for a JSON document, anything else for SQLite (-d, --database)
    #[arg(short = 'd', long, global = true, env = "LISTWATCH_DATABASE", default_value = "listwatch.db")]
    database: PathBuf,

    /// Log filter, e.g. `debug` or `listwatch_scrapers=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a search to monitor
    #[command(long_about = "Register a search to monitor. The search is fetched once first and a preview of what it currently shows is printed.")]
    Add(AddCommand),

    /// Stop monitoring a search
    Remove(RemoveCommand),

    /// List an owner's searches
    List(OwnerArgs),

    /// Fetch an owner's searches once and preview the results without recording anything
    Test(OwnerArgs),

    /// Run one poll cycle over every registered search
    Poll(CycleArgs),

    /// Run poll cycles on a timer until interrupted
    Watch(WatchCommand),

    /// Export the listings last seen by an owner's searches to CSV
    Export(ExportCommand),
}

#[derive(Args)]
struct OwnerArgs {
    /// Owner of the searches, e.g. a Telegram chat id (-u, --owner)
    #[arg(short = 'u', long, env = "LISTWATCH_OWNER")]
    owner: String,
}

#[derive(Args)]
struct AddCommand {
    #[command(flatten)]
    owner: OwnerArgs,

    /// Search URL to monitor
    query_spec: String,

    /// Human-readable name for the search (-l, --label)
    #[arg(short = 'l', long, default_value = DEFAULT_LABEL)]
    label: String,

    /// Seconds between two polls of this search (-i, --interval)
    #[arg(short = 'i', long)]
    interval: Option<u64>,

    /// Record the listings shown right now as already seen
    #[arg(long)]
    seed: bool,
}

#[derive(Args)]
struct RemoveCommand {
    #[command(flatten)]
    owner: OwnerArgs,

    /// Id of the search, as printed by `list`
    query_id: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NotifierKind {
    Log,
    Stdout,
    Telegram,
}

#[derive(Args)]
struct CycleArgs {
    /// Where new listings are reported (-n, --notifier)
    #[arg(short = 'n', long, value_enum, default_value_t = NotifierKind::Stdout)]
    notifier: NotifierKind,

    /// Bot token for the Telegram notifier
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Seconds to wait between two fetches within a cycle
    #[arg(long, default_value_t = listwatch_core::config::DEFAULT_PACING_DELAY_SECS)]
    pacing: u64,
}

#[derive(Args)]
struct WatchCommand {
    #[command(flatten)]
    cycle: CycleArgs,

    /// Seconds between two poll cycles (-e, --every)
    #[arg(short = 'e', long, default_value_t = listwatch_core::config::DEFAULT_POLL_INTERVAL_SECS)]
    every: u64,
}

#[derive(Args)]
struct ExportCommand {
    #[command(flatten)]
    owner: OwnerArgs,

    /// Output file path (-o, --output)
    #[arg(short = 'o', long, default_value = "listings.csv")]
    output: PathBuf,
}

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_registry(database: &Path, config: &WatchConfig) -> Result<Arc<Registry>> {
    let store = open_store(database)
        .await
        .with_context(|| format!("opening registry store {}", database.display()))?;
    let registry = Registry::open(store, config.default_poll_interval)
        .await
        .context("loading registry")?;
    Ok(Arc::new(registry))
}

fn build_notifier(args: &CycleArgs) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match args.notifier {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Stdout => Arc::new(StdoutNotifier),
        NotifierKind::Telegram => {
            let Some(token) = args.telegram_token.as_deref() else {
                bail!("the telegram notifier needs --telegram-token or TELEGRAM_BOT_TOKEN");
            };
            Arc::new(TelegramNotifier::new(token))
        }
    };
    Ok(notifier)
}

fn print_preview(outcome: &ExtractionOutcome, label: &str) {
    match outcome {
        ExtractionOutcome::Found(records) => {
            println!("{}: {} listings found", label, records.len());
            for record in records.iter().take(PREVIEW_LEN) {
                print!("{}", RecordDisplay::new(record, None).format());
            }
        }
        ExtractionOutcome::Inconclusive(reason) => println!("{}: {}", label, reason),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mut config = WatchConfig::default();
    if let Commands::Watch(cmd) = &cli.command {
        config.cycle_interval = Duration::from_secs(cmd.every);
    }
    config.validate()?;

    match cli.command {
        Commands::Add(cmd) => {
            let owner = OwnerId::new(cmd.owner.owner);
            let scraper = MarketplaceScraper::from_config(&config)?;
            let outcome = scraper.fetch_listings(&cmd.query_spec).await;
            print_preview(&outcome, &cmd.label);

            let registry = open_registry(&cli.database, &config).await?;
            let query_id = registry
                .register(&owner, &cmd.query_spec, &cmd.label, cmd.interval.map(Duration::from_secs))
                .await
                .context("registering search")?;

            if cmd.seed && outcome.is_found() {
                let records = outcome.into_records();
                let seeded = records.len();
                registry
                    .update(&owner, query_id, move |query| query.last_seen = records)
                    .await
                    .context("recording current listings")?;
                info!("Marked {} current listings as seen", seeded);
            }
            println!("Added search {} for {}", query_id, owner);
        }
        Commands::Remove(cmd) => {
            let owner = OwnerId::new(cmd.owner.owner);
            let registry = open_registry(&cli.database, &config).await?;
            if registry.unregister(&owner, QueryId(cmd.query_id)).await? {
                println!("Removed search {}", QueryId(cmd.query_id));
            } else {
                bail!("{} has no search {}", owner, QueryId(cmd.query_id));
            }
        }
        Commands::List(cmd) => {
            let owner = OwnerId::new(cmd.owner);
            let registry = open_registry(&cli.database, &config).await?;
            let queries = registry.list(&owner).await;
            if queries.is_empty() {
                println!("No searches registered for {}", owner);
            } else {
                println!("{}", create_query_table(&queries));
            }
        }
        Commands::Test(cmd) => {
            let owner = OwnerId::new(cmd.owner);
            let registry = open_registry(&cli.database, &config).await?;
            let scraper = MarketplaceScraper::from_config(&config)?;

            let queries = registry.list(&owner).await;
            if queries.is_empty() {
                println!("No searches registered for {}", owner);
            }
            for (index, (query_id, query)) in queries.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(config.pacing_delay).await;
                }
                let outcome = scraper.fetch_listings(&query.query_spec).await;
                print_preview(&outcome, &format!("{} {}", query_id, query.label));
            }
        }
        Commands::Poll(cmd) => {
            let registry = open_registry(&cli.database, &config).await?;
            let cycle = build_cycle(registry, &config, &cmd)?;
            let report = cycle.run().await;
            println!(
                "Polled {} searches ({} not due): {} new listings, {} failed searches, {} failed notifications",
                report.polled, report.skipped, report.new_records, report.failed_queries, report.failed_notifications
            );
        }
        Commands::Watch(cmd) => {
            let registry = open_registry(&cli.database, &config).await?;
            let cycle = build_cycle(registry.clone(), &config, &cmd.cycle)?;

            let start = tokio::time::Instant::now() + config.first_cycle_delay;
            let mut ticker = tokio::time::interval_at(start, config.cycle_interval);
            info!(
                "Watching {} searches every {}s, first cycle in {}s",
                registry.keys().await.len(),
                config.cycle_interval.as_secs(),
                config.first_cycle_delay.as_secs()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Pick up searches added or removed by other invocations.
                        if let Err(e) = registry.reload().await {
                            error!("Reloading registry failed, polling the last known state: {}", e);
                        }
                        let report = cycle.run().await;
                        if report.failed_queries > 0 || report.failed_notifications > 0 {
                            warn!("Cycle finished with failures: {:?}", report);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping");
                        break;
                    }
                }
            }
        }
        Commands::Export(cmd) => {
            let owner = OwnerId::new(cmd.owner.owner);
            let registry = open_registry(&cli.database, &config).await?;
            let queries = registry.list(&owner).await;

            let mut writer = Writer::from_path(&cmd.output)
                .with_context(|| format!("creating {}", cmd.output.display()))?;
            writer.write_record(["Search", "Label", "Id", "Title", "Price", "Currency", "URL", "Photo"])?;
            let mut rows = 0;
            for (query_id, query) in &queries {
                for record in &query.last_seen {
                    writer.write_record([
                        query_id.0.to_string(),
                        query.label.clone(),
                        record.id.clone(),
                        record.title.clone(),
                        record.price.to_string(),
                        record.currency.clone(),
                        record.url.to_string(),
                        record.photo.as_ref().map(|photo| photo.to_string()).unwrap_or_default(),
                    ])?;
                    rows += 1;
                }
            }
            writer.flush()?;
            println!("Exported {} listings to {}", rows, cmd.output.display());
        }
    }

    Ok(())
}

fn build_cycle(registry: Arc<Registry>, config: &WatchConfig, args: &CycleArgs) -> Result<PollCycle> {
    let scraper = MarketplaceScraper::from_config(config)?;
    let detector = ChangeDetector::new(Arc::new(scraper)).with_policy(config.timestamp_policy);
    let notifier = build_notifier(args)?;
    Ok(PollCycle::new(registry, detector, notifier).with_pacing_delay(Duration::from_secs(args.pacing)))
}
