//! Engage Server entry point
//!
//! Runs against PostgreSQL when `DATABASE_URL` is set; otherwise falls back
//! to the in-memory store, which is enough for local development and demos
//! but forgets everything on restart.

mod api;
mod config;
mod db;
mod engine;
mod error;
mod models;
mod notify;
mod repo;
mod state;
mod username;
mod websocket;

use std::sync::Arc;

use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::notify::Notifier;
use crate::repo::memory::MemoryRepository;
use crate::repo::Repository;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "engage-server")]
#[command(about = "Audience Engagement & Moderation Engine")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080", env = "PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// PostgreSQL connection URL; omit to run on the in-memory store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Shared secret for schedule sync and venue administration
    #[arg(long, env = "SYNC_API_KEY")]
    sync_api_key: Option<String>,

    /// Questions a user may submit per 60s window
    #[arg(long, default_value = "3", env = "MAX_QUESTIONS_PER_INTERVAL")]
    max_questions_per_interval: u64,

    /// Lifetime question cap per user per event
    #[arg(long, default_value = "10", env = "MAX_QUESTIONS_PER_EVENT")]
    max_questions_per_event: u64,

    /// Vote toggles per user per event per 60s window
    #[arg(long, default_value = "20", env = "MAX_VOTES_PER_EVENT")]
    max_votes_per_event: u64,

    /// Reactions per user per 30s window
    #[arg(long, default_value = "5", env = "MAX_REACTIONS_PER_INTERVAL")]
    max_reactions_per_interval: u64,

    /// Maximum question length in characters
    #[arg(long, default_value = "200", env = "MAX_CHARS_PER_QUESTION")]
    max_chars_per_question: usize,

    /// Ban duration in hours; 0 means blocks are permanent
    #[arg(long, default_value = "24", env = "BAN_HOURS")]
    ban_hours: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("engage_server=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = EngineConfig {
        max_questions_per_interval: args.max_questions_per_interval,
        max_questions_per_event: args.max_questions_per_event,
        max_votes_per_event: args.max_votes_per_event,
        max_reactions_per_interval: args.max_reactions_per_interval,
        max_chars_per_question: args.max_chars_per_question,
        ban_hours: (args.ban_hours > 0).then_some(args.ban_hours),
    };

    let repo: Arc<dyn Repository> = match &args.database_url {
        Some(url) => {
            let pool = db::init_db(url).await?;
            info!("Storage: PostgreSQL");
            Arc::new(db::PgRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage");
            Arc::new(MemoryRepository::new())
        }
    };

    if args.sync_api_key.is_none() {
        warn!("SYNC_API_KEY not set, schedule sync endpoints are disabled");
    }

    let notifier = Arc::new(Notifier::default());
    let engine = Arc::new(Engine::new(repo, notifier.clone(), config));
    let state = Arc::new(AppState::new(engine, notifier, args.sync_api_key.clone()));

    let app = api::router(state)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready at http://{addr}");
    info!("WebSocket feed at ws://{addr}/ws");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
