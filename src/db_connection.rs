use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info, warn};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::tokio::task;
use rocket::Request;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::HelpdeskError;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applied to every connection when it is first opened by the pool.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url == ":memory:" || database_url.starts_with("file::memory:")
}

/// Initializes a database pool, creating the database directory if needed.
///
/// Every SQLite connection to `:memory:` opens its own private database, so an
/// in-memory pool is held to a single connection that is never recycled.
pub fn init_db_connection_pool(config: &Config) -> Result<SqlitePool, HelpdeskError> {
    let database_url = config.database_url.as_str();
    let in_memory = is_in_memory(database_url);
    if let Some(dir) = Path::new(database_url).parent() {
        if !dir.as_os_str().is_empty() && !in_memory {
            fs::create_dir_all(dir)?;
        }
    }

    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let mut builder = SqlitePool::builder().connection_customizer(Box::new(SqlitePragmas));
    builder = if in_memory {
        if config.pool_size > 1 {
            warn!(
                "In-memory database requested; using 1 pooled connection instead of {}",
                config.pool_size
            );
        }
        builder.max_size(1).max_lifetime(None).idle_timeout(None)
    } else {
        builder.max_size(config.pool_size)
    };
    let pool = builder.build(manager)?;

    info!("Database pool ready at {} ({} connections)", database_url, pool.max_size());
    Ok(pool)
}

/// Creates the ticket and metrics tables if they do not exist yet.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<(), HelpdeskError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| HelpdeskError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

/// Runs migrations on a connection checked out of the pool.
pub fn run_pending_migrations(pool: &SqlitePool) -> Result<(), HelpdeskError> {
    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;
    info!("Database initialized successfully");
    Ok(())
}

/// Round-trips `SELECT 1` through a pooled connection.
pub fn check_database(pool: &SqlitePool) -> Result<(), HelpdeskError> {
    let mut conn = pool.get()?;
    diesel::sql_query("SELECT 1").execute(&mut conn)?;
    Ok(())
}

/// Set in the request-local cache when a connection could not be checked out,
/// so the 500 catcher can report why.
#[derive(Debug, Default)]
pub struct CheckoutFailure(pub Option<String>);

// Connection request guard type: a wrapper around an r2d2 pooled connection.
pub struct DbConn(pub PooledConnection<ConnectionManager<SqliteConnection>>);

impl DbConn {
    /// Runs `f` against this connection on the blocking thread pool. The
    /// connection goes back to the pool when `f` returns.
    pub async fn run<F, T>(self, f: F) -> Result<T, HelpdeskError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, HelpdeskError> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.0;
        task::spawn_blocking(move || f(&mut *conn))
            .await
            .map_err(|e| HelpdeskError::Internal(e.to_string()))?
    }
}

/// Attempts to retrieve a single connection from the managed database pool. If
/// no pool is managed or no connection can be checked out, fails with an
/// `InternalServerError` status.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for DbConn {
    type Error = HelpdeskError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let pool = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool.clone(),
            None => {
                let err = HelpdeskError::Internal("database pool is not configured".to_string());
                return fail(request, err);
            }
        };

        let checkout = task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| HelpdeskError::Internal(e.to_string()))
            .and_then(|conn| conn.map_err(HelpdeskError::from));

        match checkout {
            Ok(conn) => Outcome::Success(DbConn(conn)),
            Err(err) => fail(request, err),
        }
    }
}

fn fail(request: &Request<'_>, err: HelpdeskError) -> request::Outcome<DbConn, HelpdeskError> {
    error!("{} {}: {}", request.method(), request.uri(), err);
    request.local_cache(|| CheckoutFailure(Some(err.to_string())));
    Outcome::Error((Status::InternalServerError, err))
}
