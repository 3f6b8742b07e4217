pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{ClaimAllocator, CrmStore, MongoStore, Notifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CrmStore>,
    pub allocator: ClaimAllocator,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("crm-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = MongoStore::new(&db);
        store.init_indexes().await?;

        Self::build_with_store(config, Arc::new(store)).await
    }

    /// Build against an explicit store. The integration suite uses this
    /// with the in-memory store.
    pub async fn build_with_store(
        config: Config,
        store: Arc<dyn CrmStore>,
    ) -> anyhow::Result<Self> {
        let notifier = Notifier::new(store.clone());
        let allocator = ClaimAllocator::new(
            store.clone(),
            notifier,
            config.claims.min_lead_balance_paise,
        );

        let state = AppState {
            config: config.clone(),
            store,
            allocator,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            // Lead entry and per-lead views
            .route("/leads", post(handlers::leads::create_lead))
            .route("/leads", get(handlers::leads::list_leads))
            .route("/leads/:id", get(handlers::leads::get_lead))
            .route(
                "/leads/:id/payment-entries",
                post(handlers::leads::record_payment_entry),
            )
            .route("/leads/:id/claims", get(handlers::leads::claims_for_lead))
            // Payment pool and claims
            .route("/payments", post(handlers::payments::create_payment))
            .route(
                "/payments/available",
                get(handlers::payments::list_available_payments),
            )
            .route(
                "/payments/check-lead/:lead_id",
                get(handlers::payments::check_lead),
            )
            .route(
                "/payments/:id/claim-with-lead",
                post(handlers::payments::claim_with_lead),
            )
            // Notifications
            .route(
                "/notifications",
                get(handlers::notifications::list_notifications),
            )
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random free port, used by the test harness.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
