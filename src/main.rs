use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use warp::Filter;

use keittokirja_sdk::error::handle_rejection;
use keittokirja_sdk::{routes, Config};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Arc::new(Config::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            log::error!("Could not connect to the database: {e}");
        })
        .expect("Database unreachable!");

    log::info!("Listening on {}", config.bind_addr);

    warp::serve(routes(pool, config.clone()).recover(handle_rejection))
        .run(config.bind_addr)
        .await;
}
