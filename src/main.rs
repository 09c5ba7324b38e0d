use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quant_relay::analysis::Analyzer;
use quant_relay::analysis::gemini::GeminiModel;
use quant_relay::config::Settings;
use quant_relay::consts::{
    AUTHOR, DEFAULT_CACHE_TTL_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION,
    DEFAULT_MAX_CONCURRENT_CHUNKS, DEFAULT_PORT, default_db_path,
};
use quant_relay::flow::langflow::LangflowRunner;
use quant_relay::scrape::apify::ApifyActor;
use quant_relay::scrape::{ReplaceScope, Scraper};
use quant_relay::server::{self, AppState, FlowInfo};
use quant_relay::store::DocumentStore;
use quant_relay::store::data_api::DataApiStore;
use quant_relay::store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(
    name = "quant-relay",
    version,
    author = AUTHOR,
    about = "Relay for flow execution, profile scraping and chunked analysis."
)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite database for scraped documents when no managed database is
    /// configured (use :memory: for ephemeral)
    #[arg(short, long)]
    db: Option<String>,

    /// JSON dataset analyzed by /analysis
    #[arg(long, default_value = "data.json")]
    data: PathBuf,

    /// Records per language-model call
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Language-model calls in flight per analysis
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_CHUNKS)]
    max_concurrency: usize,

    /// What a fresh scrape replaces in the store
    #[arg(long, value_enum, default_value_t = ReplaceScope::Collection)]
    replace_scope: ReplaceScope,

    /// Seconds a scrape result is served from cache
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS)]
    cache_ttl_secs: u64,

    /// Collection holding scraped profiles
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quant_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_store(cli: &Cli, settings: &Settings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if let Some((endpoint, token)) = settings.data_api() {
        info!(endpoint, "using managed document database");
        let store = DataApiStore::new(endpoint, token, settings.data_api_keyspace.as_deref())?;
        return Ok(Arc::new(store));
    }

    let path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let path = default_db_path();
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            path.to_string_lossy().into_owned()
        }
    };
    info!(path = %path, "using local document database");
    Ok(Arc::new(SqliteStore::open(&path)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal in deployed environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let store = open_store(&cli, &settings)?;
    match store.list_collections().await {
        Ok(collections) => info!(?collections, "available collections"),
        Err(e) => warn!(error = %format!("{e:#}"), "could not list collections"),
    }

    let flow = Arc::new(LangflowRunner::new(settings.flow.clone())?);
    let actor = Arc::new(ApifyActor::new(
        settings.apify_token.clone(),
        settings.apify_base_url.clone(),
    )?);
    let model = GeminiModel::new(settings.gemini_api_key.clone(), settings.gemini_model.clone())?;
    info!(model = model.model(), dataset = %cli.data.display(), "analysis configured");

    let scraper = Scraper::new(
        actor,
        Arc::clone(&store),
        &cli.collection,
        cli.replace_scope,
        Duration::from_secs(cli.cache_ttl_secs),
    );
    let analyzer = Analyzer::new(
        Arc::new(model),
        cli.data.clone(),
        cli.chunk_size,
        cli.max_concurrency,
    );

    let state = AppState {
        flow,
        flow_info: FlowInfo {
            langflow_id: settings.flow.langflow_id.clone(),
            flow_id: settings.flow.flow_id.clone(),
        },
        default_tweaks: settings.default_tweaks.clone(),
        scraper: Arc::new(scraper),
        analyzer: Arc::new(analyzer),
        store,
        collection: cli.collection.clone(),
    };

    server::serve(SocketAddr::new(cli.host, cli.port), state).await
}
