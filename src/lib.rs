pub mod amount;
pub mod config;
pub mod domain {
    pub mod notification;
    pub mod session;
    pub mod transaction;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod notifications;
        pub mod ops;
        pub mod payments;
    }
    pub mod middleware {
        pub mod auth;
    }
}
pub mod repo {
    pub mod catalog_repo;
    pub mod enrollments_repo;
    pub mod notification_log_repo;
    pub mod reconciliation_repo;
    pub mod sessions_repo;
    pub mod transactions_repo;
}
pub mod service {
    pub mod alerts;
    pub mod monitoring;
    pub mod notification_processor;
    pub mod payment_service;
    pub mod reconciliation;
    pub mod retry;
    pub mod security_log;
    pub mod session_sweeper;
    pub mod sessions;
    pub mod side_effects;
}

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub processor: service::notification_processor::NotificationProcessor,
    pub monitoring: service::monitoring::MonitoringService,
    pub notification_log: repo::notification_log_repo::NotificationLogRepo,
    pub internal_api_key: String,
}
