use std::sync::Arc;

use clap::Parser;
use jurnl_core::config::StoreBackend;
use jurnl_core::{
    ChatCompletionsClient, JurnlConfig, LlmBackend, MemoryStore, PgStore, SessionProvider, Store,
    SupabaseSessionClient,
};
use tokio::sync::{broadcast, Mutex};
use tracing_subscriber::{fmt, EnvFilter};

use jurnl_server::http::{self, AppState};
use jurnl_server::subsystems::scheduler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "jurnl.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match JurnlConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let store: Arc<dyn Store> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = match jurnl_core::db::create_pool(&config.database).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            };

            if args.health {
                match jurnl_core::db::health_check(&pool).await {
                    Ok(v) => {
                        println!("✅ PostgreSQL connected: {}", v);
                        return Ok(());
                    }
                    Err(e) => {
                        println!("❌ PostgreSQL connection failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }

            if config.database.run_migrations {
                jurnl_core::db::run_migrations(&pool).await?;
                tracing::info!("Database migrations applied");
            }
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            if args.health {
                println!("✅ In-memory store (no database configured)");
                return Ok(());
            }
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let sessions: Arc<dyn SessionProvider> = Arc::new(SupabaseSessionClient::new(&config.auth)?);
    let chat_llm: Arc<dyn LlmBackend> = Arc::new(ChatCompletionsClient::new(&config.chat)?);
    let summary_llm: Arc<dyn LlmBackend> = Arc::new(ChatCompletionsClient::new(&config.summary)?);

    if config.chat.api_key.is_empty() {
        tracing::warn!("No chat API key configured; /api/chat will fail");
    }
    if config.cron.secret.is_none() {
        tracing::warn!("No cron secret configured; /api/cron/process-streams is disabled");
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let batch_lock = Arc::new(Mutex::new(()));
    let scheduler_handle = tokio::spawn(scheduler::run_batch_loop(
        store.clone(),
        summary_llm.clone(),
        config.clone(),
        batch_lock.clone(),
        tx.subscribe(),
    ));

    let state = Arc::new(AppState {
        store,
        sessions,
        chat_llm,
        summary_llm,
        config,
        batch_lock,
    });

    http::start_http_server(state, tx.subscribe()).await?;
    let _ = scheduler_handle.await;

    Ok(())
}
