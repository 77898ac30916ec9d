use log::info;

use helpdesk::db_connection::{init_db_connection_pool, run_pending_migrations};
use helpdesk::{build_rocket, logging, Config, HelpdeskError};

#[rocket::main]
async fn main() -> Result<(), HelpdeskError> {
    let config = Config::from_env();
    logging::init(&config);

    let pool = init_db_connection_pool(&config)?;
    run_pending_migrations(&pool)?;

    info!(
        "Starting {} on {}:{}",
        config.service_name, config.address, config.port
    );
    build_rocket(config, pool)
        .launch()
        .await
        .map_err(|e| HelpdeskError::Internal(e.to_string()))?;
    Ok(())
}
