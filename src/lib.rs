pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod openapi;
pub mod schema;

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub use db::{create_pool, DbPool};

use application::invoice::RandomInvoiceNumbers;
use application::order_service::{OrderService, Ports};
use config::Settings;
use domain::tax::HomeStatePolicy;
use infrastructure::audit::DieselAuditLog;
use infrastructure::catalog_repo::{DieselCatalog, DieselStockLedger};
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::outbox::DieselOutboxSink;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    log::info!("Applied {} pending migration(s)", applied.len());
    Ok(())
}

/// Wires every port to its Postgres adapter.
pub fn diesel_ports(pool: DbPool, settings: &Settings) -> Ports {
    Ports {
        catalog: Arc::new(DieselCatalog::new(pool.clone())),
        ledger: Arc::new(DieselStockLedger::new(
            pool.clone(),
            settings.stock_decrement_timeout,
        )),
        orders: Arc::new(DieselOrderRepository::new(pool.clone())),
        tax_policy: Arc::new(HomeStatePolicy::new(settings.seller_home_state.clone())),
        notifications: Arc::new(DieselOutboxSink::new(pool.clone())),
        audit: Arc::new(DieselAuditLog::new(pool)),
        invoices: Arc::new(RandomInvoiceNumbers),
    }
}

/// Mounts the `/orders` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    use handlers::orders;

    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(orders::create_order))
            .route("", web::get().to(orders::list_orders))
            .route("/{id}", web::get().to(orders::get_order))
            .route("/{id}/events", web::get().to(orders::status_history))
            .route("/{id}/status", web::post().to(orders::update_status))
            .route("/{id}/cancel", web::post().to(orders::cancel_order))
            .route("/{id}/payment-status", web::post().to(orders::update_payment_status))
            .route("/{id}/tax-exempt", web::post().to(orders::mark_tax_exempt)),
    );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    service: web::Data<OrderService>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(openapi::swagger_ui())
    })
    .bind((host.to_string(), port))?
    .run())
}
