//! Credo API server binary.
//!
//! Serves the credential lifecycle over HTTP, backed by PostgreSQL.

use std::sync::Arc;

use clap::Parser;
use credo_api::config::ApiConfig;
use credo_core::auth::password::BcryptHasher;
use credo_core::clock::SystemClock;
use credo_core::events::TracingPublisher;
use credo_core::store::{CredentialStore, PgCredentialStore};
use credo_core::{AuthLifecycle, UserDirectory};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "credo_api_server", about = "Credo credential lifecycle API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = credo_api::config::DEFAULT_BIND_ADDR)]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = credo_api::config::DEFAULT_DATABASE_URL
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Skip embedded migrations on startup.
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new("info,credo_api=debug,credo_core=debug")
                })?,
        )
        .init();

    let args = Args::parse();

    let config = ApiConfig {
        bind_addr: args.bind_addr,
        database_url: args.database_url,
        ..ApiConfig::from_env()
    };

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting credo_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    if args.skip_migrations {
        info!("skipping database migrations");
    } else {
        info!("running database migrations");
        credo_api::migrate(&pool).await?;
    }

    let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));
    let auth = AuthLifecycle::with_defaults(
        store.clone(),
        Arc::new(TracingPublisher),
        config.jwt_secret.as_bytes(),
        config.policy.clone(),
    );
    let users = UserDirectory::new(
        store,
        Arc::new(BcryptHasher::new(config.policy.bcrypt_cost)),
        Arc::new(SystemClock),
    );

    let state = credo_api::AppState {
        auth: Arc::new(auth),
        users: Arc::new(users),
        config: config.clone(),
    };
    let app = credo_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
