use std::env;
use std::fs::File;
use std::process::exit;

use sqlx::postgres::PgPoolOptions;

use keittokirja_sdk::actions::ingredients;

/// Seeds the `ingredients` reference table from a headerless
/// `name,measurement_unit` CSV file. Re-running is safe: existing rows
/// are left untouched.
#[tokio::main]
async fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            log::error!("usage: load_ingredients <ingredients.csv>");
            exit(2);
        }
    };

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| {
            log::error!("Environment variable DATABASE_URL is not set");
        })
        .expect("Environment misconfigured!");

    let file = File::open(&path)
        .map_err(|e| {
            log::error!("Could not open {path}: {e}");
        })
        .expect("Ingredient file unreadable!");

    let entries = ingredients::read_ingredient_records(file)
        .map_err(|e| {
            log::error!("Could not parse {path}: {e}");
        })
        .expect("Ingredient file malformed!");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .map_err(|e| {
            log::error!("Could not connect to the database: {e}");
        })
        .expect("Database unreachable!");

    let inserted = ingredients::import_ingredients(&entries, &pool)
        .await
        .map_err(|e| {
            log::error!("Import failed: {e}");
        })
        .expect("Import failed!");

    log::info!(
        "Imported {inserted} of {} ingredients ({} already present)",
        entries.len(),
        entries.len() as u64 - inserted
    );
}
