//! Workshop Ledger - Main Application Entry Point
//!
//! Cash ledger, FIFO stock lots and investor attribution for small
//! businesses. Every account keeps an append-only chain of entries with a
//! running balance; stock is held in lots consumed oldest-first; lots
//! financed by an investor carry attributions that move through
//! `available -> sold -> paid`.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, row locks per key)
//! - **Authentication**: company API key with SHA-256 hashing
//! - **Maintenance**: repair jobs runnable over HTTP or from this binary
//!
//! # Usage
//!
//! ```text
//! workshop-ledger                       # same as `serve`
//! workshop-ledger serve
//! workshop-ledger repair balances --company 550e8400-...
//! ```

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

#[cfg(test)]
mod test_support;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use clap::{Parser, Subcommand, ValueEnum};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{db::DbPool, models::report::RepairJob, services::reconciliation_service};

#[derive(Debug, Parser)]
#[command(name = "workshop-ledger", version, about = "Cash ledger, FIFO stock and investor attribution service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Run one repair job to completion and print its report as JSON
    Repair {
        #[arg(value_enum)]
        job: JobArg,

        /// Restrict the job to one company
        #[arg(long, env = "REPAIR_COMPANY_ID")]
        company: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobArg {
    Balances,
    Orphans,
    Investors,
}

impl From<JobArg> for RepairJob {
    fn from(arg: JobArg) -> Self {
        match arg {
            JobArg::Balances => RepairJob::BalanceRepair,
            JobArg::Orphans => RepairJob::OrphanRepair,
            JobArg::Investors => RepairJob::InvestorCleanup,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default "info" level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config.server_port).await,
        Command::Repair { job, company } => {
            let report = reconciliation_service::run(&pool, job.into(), company).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(pool: DbPool, port: u16) -> anyhow::Result<()> {
    let app = router(pool);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(pool: DbPool) -> Router {
    use handlers::{accounts, investors, items, jobs, ledger, purchases, sales};

    let authenticated_routes = Router::new()
        // Accounts and their ledger chains
        .route(
            "/api/v1/accounts",
            post(accounts::create_account).get(accounts::list_accounts),
        )
        .route(
            "/api/v1/accounts/{id}",
            get(accounts::get_account).patch(accounts::update_account),
        )
        .route("/api/v1/accounts/{id}/entries", get(accounts::list_entries))
        .route("/api/v1/ledger/entries", post(ledger::create_manual_entry))
        // Items and stock lots
        .route(
            "/api/v1/items",
            post(items::create_item).get(items::list_items),
        )
        .route("/api/v1/items/{id}", get(items::get_item))
        .route("/api/v1/items/{id}/lots", get(items::list_lots))
        .route("/api/v1/items/{id}/receive", post(items::receive_stock))
        .route("/api/v1/items/{id}/consume", post(items::consume_stock))
        // Workflows
        .route("/api/v1/purchases", post(purchases::create_purchase))
        .route("/api/v1/purchases/{id}", delete(purchases::delete_purchase))
        .route("/api/v1/sales/close", post(sales::close_sale))
        // Investors
        .route(
            "/api/v1/investors/{id}/summary",
            get(investors::investor_summary),
        )
        .route(
            "/api/v1/investors/{id}/attributions",
            get(investors::list_attributions),
        )
        .route("/api/v1/investors/{id}/payouts", post(investors::pay_investor))
        .route(
            "/api/v1/investments/{id}",
            delete(investors::delete_attribution),
        )
        // Maintenance
        .route("/api/v1/jobs/{job}", post(jobs::run_job))
        .route_layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(pool)
}
