use std::io;

use actix_web::web;
use dotenvy::dotenv;
use fulfillment_engine::application::order_service::OrderService;
use fulfillment_engine::config::Settings;
use fulfillment_engine::{build_server, create_pool, diesel_ports, run_migrations};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env().map_err(io::Error::other)?;

    let pool = create_pool(&settings.database_url, settings.db_pool_size).map_err(io::Error::other)?;
    run_migrations(&pool).map_err(io::Error::other)?;

    let service = web::Data::new(OrderService::new(
        diesel_ports(pool, &settings),
        settings.wholesale_discount_pct.clone(),
    ));

    log::info!(
        "Starting server at http://{}:{} (home state {})",
        settings.host,
        settings.port,
        settings.seller_home_state
    );

    build_server(service, &settings.host, settings.port)?.await
}
