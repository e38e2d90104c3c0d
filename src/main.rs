use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use course_payments::config::AppConfig;
use course_payments::gateways::razorpay::RazorpayGateway;
use course_payments::gateways::PaymentGateway;
use course_payments::repo::catalog_repo::CatalogRepo;
use course_payments::repo::enrollments_repo::EnrollmentsRepo;
use course_payments::repo::notification_log_repo::NotificationLogRepo;
use course_payments::repo::reconciliation_repo::ReconciliationRepo;
use course_payments::repo::sessions_repo::SessionsRepo;
use course_payments::repo::transactions_repo::TransactionsRepo;
use course_payments::service::alerts::{AlertNotifier, AlertSink};
use course_payments::service::monitoring::{LatencyStore, MonitoringService};
use course_payments::service::notification_processor::NotificationProcessor;
use course_payments::service::payment_service::PaymentService;
use course_payments::service::reconciliation::ReconciliationEngine;
use course_payments::service::retry::RetryPolicy;
use course_payments::service::security_log::SecurityLog;
use course_payments::service::session_sweeper::SessionSweeper;
use course_payments::service::sessions::SessionManager;
use course_payments::service::side_effects::SideEffectQueue;
use course_payments::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;

    let transactions_repo = TransactionsRepo { pool: pool.clone() };
    let sessions_repo = SessionsRepo { pool: pool.clone() };
    let notification_log = NotificationLogRepo { pool: pool.clone() };
    let enrollments = EnrollmentsRepo { pool: pool.clone() };
    let catalog = CatalogRepo { pool: pool.clone() };
    let reconciliation_repo = ReconciliationRepo { pool: pool.clone() };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(RazorpayGateway {
        base_url: cfg.gateway_base_url.clone(),
        key_id: cfg.gateway_key_id.clone(),
        key_secret: cfg.gateway_key_secret.clone(),
        webhook_secret: cfg.gateway_webhook_secret.clone(),
        timeout_ms: cfg.gateway_timeout_ms,
        client: reqwest::Client::new(),
    });

    let alerts: Arc<dyn AlertSink> = Arc::new(AlertNotifier {
        client: reqwest::Client::new(),
        ops_webhook_url: cfg.ops_webhook_url.clone(),
    });
    let security_log = SecurityLog {
        pool: pool.clone(),
        alerts: alerts.clone(),
    };
    let latency_store = LatencyStore {
        client: redis::Client::open(cfg.redis_url.clone())?,
    };
    let side_effects = SideEffectQueue::start(1024);
    let sessions = SessionManager {
        repo: sessions_repo.clone(),
    };
    let retry_policy = RetryPolicy::default();

    let processor = NotificationProcessor {
        pool: pool.clone(),
        transactions_repo: transactions_repo.clone(),
        sessions: sessions.clone(),
        notification_log: notification_log.clone(),
        catalog: catalog.clone(),
        enrollments: enrollments.clone(),
        gateway: gateway.clone(),
        security_log,
        side_effects,
        retry_policy,
    };

    let payment_service = PaymentService {
        transactions_repo: transactions_repo.clone(),
        sessions,
        catalog,
        gateway: gateway.clone(),
        latency_store: latency_store.clone(),
        processor: processor.clone(),
        retry_policy,
    };

    let monitoring = MonitoringService::new(
        pool.clone(),
        transactions_repo.clone(),
        latency_store,
        alerts.clone(),
        redis_client,
    );

    let sweeper = SessionSweeper::new(sessions_repo, transactions_repo.clone(), retry_policy);
    let reconciliation = ReconciliationEngine::new(
        transactions_repo,
        reconciliation_repo,
        gateway,
        alerts,
        cfg.reconciliation_recipients.clone(),
    );

    tokio::spawn(sweeper.run());
    tokio::spawn(reconciliation.run());
    tokio::spawn(monitoring.clone().run());

    let state = AppState {
        payment_service,
        processor,
        monitoring,
        notification_log,
        internal_api_key: cfg.internal_api_key.clone(),
    };

    let admin_key = cfg.internal_api_key.clone();
    let admin_routes = Router::new()
        .route(
            "/payments/:transaction_id/refund",
            post(course_payments::http::handlers::payments::refund),
        )
        .route(
            "/payments/:transaction_id/notifications",
            get(course_payments::http::handlers::payments::notification_audit),
        )
        .layer(from_fn_with_state(
            admin_key,
            course_payments::http::middleware::auth::require_internal_api_key,
        ));

    let app = Router::new()
        .route(
            "/payments/initiate",
            post(course_payments::http::handlers::payments::initiate),
        )
        .route(
            "/payments/webhook",
            post(course_payments::http::handlers::notifications::webhook),
        )
        .route(
            "/payments/callback",
            post(course_payments::http::handlers::notifications::callback),
        )
        .route(
            "/payments/history",
            get(course_payments::http::handlers::payments::history),
        )
        .route(
            "/payments/:transaction_id/status",
            get(course_payments::http::handlers::payments::status),
        )
        .route(
            "/payments/:transaction_id/retry",
            post(course_payments::http::handlers::payments::retry),
        )
        .route("/ops/readiness", get(course_payments::http::handlers::ops::readiness))
        .route("/ops/liveness", get(course_payments::http::handlers::ops::liveness))
        .route("/ops/health", get(course_payments::http::handlers::ops::health))
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
