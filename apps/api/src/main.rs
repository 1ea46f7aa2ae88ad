mod audit;
mod config;
mod db;
mod delivery;
mod errors;
mod extract;
mod llm_client;
mod orders;
mod payments;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audit::QualityAuditor;
use crate::config::Config;
use crate::db::create_pool;
use crate::delivery::{Notifier, SmtpNotifier};
use crate::llm_client::LlmClient;
use crate::orders::pg_store::PgOrderStore;
use crate::orders::store::OrderStore;
use crate::payments::stripe::StripeGateway;
use crate::payments::PaymentAdapter;
use crate::routes::{build_router, cors_layer};
use crate::state::AppState;
use crate::storage::{BlobStore, S3BlobStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shortlist API v{}", env!("CARGO_PKG_VERSION"));

    let orders: Option<Arc<dyn OrderStore>> = match &config.database {
        Some(db) => Some(Arc::new(PgOrderStore::new(create_pool(db).await?))),
        None => {
            warn!("DATABASE_URL not set; order endpoints will answer NOT_CONFIGURED");
            None
        }
    };

    let blobs: Option<Arc<dyn BlobStore>> = match &config.s3 {
        Some(s3) => {
            let store = S3BlobStore::from_config(s3, config.upstream_timeout).await;
            info!("S3 client initialized (bucket: {})", s3.bucket);
            Some(Arc::new(store))
        }
        None => {
            warn!("S3_BUCKET not set; uploaded files will not be stored");
            None
        }
    };

    let llm = match &config.llm {
        Some(llm_config) => {
            let client = LlmClient::new(llm_config)?;
            info!("LLM client initialized (model: {})", client.model());
            Some(client)
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; audits will use the fallback");
            None
        }
    };
    let auditor = Arc::new(QualityAuditor::new(llm));

    let payments = match &config.stripe {
        Some(stripe) => {
            let gateway = StripeGateway::new(stripe, config.upstream_timeout)?;
            info!(
                "Stripe gateway initialized ({} tier prices, interview add-on: {})",
                config.prices.tiers.len(),
                config.prices.interview.is_some()
            );
            Some(PaymentAdapter::new(Arc::new(gateway), config.prices.clone()))
        }
        None => {
            warn!("STRIPE_SECRET_KEY not set; checkout is disabled");
            None
        }
    };

    let notifier: Option<Arc<dyn Notifier>> = config.smtp.clone().map(|smtp| {
        info!("SMTP delivery via {}:{}", smtp.host, smtp.port);
        Arc::new(SmtpNotifier::new(smtp, config.upstream_timeout)) as Arc<dyn Notifier>
    });

    let cors = cors_layer(&config.cors);
    let port = config.port;

    let state = AppState {
        config: Arc::new(config),
        orders,
        blobs,
        payments,
        notifier,
        auditor,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
