mod database {
    pub mod actions;
    pub mod error;
    pub mod pagination;
    pub mod payload;
    pub mod schema;
    pub mod shortlink;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod server {
    pub mod handlers;
    pub mod routes;
}
mod config;
mod constants;

pub use authentication::*;
pub use config::Config;
pub use constants::*;
pub use database::*;
pub use server::routes::routes;
