use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use sqlx::postgres::PgPoolOptions;

use referral_ledger::repositories::memory::MemoryLedgerStore;
use referral_ledger::repositories::postgres::PgLedgerStore;
use referral_ledger::repositories::LedgerStore;
use referral_ledger::services;
use referral_ledger::settings::Settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "referrals.toml")]
    config: String,
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    /// Keep the ledger in memory instead of Postgres. Nothing survives a restart.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config).context("Failed to load settings.")?;

    init_logging(&args.log4rs)?;
    log::info!("Starting referral ledger.");

    let store: Arc<dyn LedgerStore> = if args.in_memory {
        log::warn!("Using the in-memory ledger.");
        Arc::new(MemoryLedgerStore::new())
    } else {
        let connect_options = settings
            .postgres
            .connect_options()
            .context("Postgres settings are incomplete; pass --in-memory to run without a database.")?;
        log::info!(
            "Connecting to Postgres at {}:{}.",
            settings.postgres.host,
            settings.postgres.port
        );
        let conn = PgPoolOptions::new()
            .max_connections(settings.postgres.max_connections)
            .connect_with(connect_options)
            .await
            .context("Could not connect to database.")?;

        let store = PgLedgerStore::new(conn);
        store.migrate().await.context("Could not migrate database.")?;
        Arc::new(store)
    };

    let listen = args.listen.unwrap_or_else(|| settings.http.listen.clone());
    services::start_services(store, settings, listen).await
}

fn init_logging(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}")))
            .build();
        let config = log4rs::Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;

        log4rs::init_config(config)?;
        log::warn!("{} not found, logging to stdout only.", path);
        return Ok(());
    }

    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow!("Could not initialize logging: {}", e))
        }
    }
}
