#[macro_use] extern crate diesel;

pub mod api;
pub mod config;
pub mod db_connection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::HelpdeskError;
pub use routes::build_rocket;
