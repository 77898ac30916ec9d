use chrono::Utc;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{self, Json};
use rocket::tokio::task;
use rocket::{catch, catchers, get, post, put, routes, Build, Request, Rocket, State};

use crate::api;
use crate::config::Config;
use crate::db_connection::{check_database, CheckoutFailure, DbConn, SqlitePool};
use crate::error::HelpdeskError;
use crate::metrics::MetricsAggregator;
use crate::models::Ticket;
use crate::store::{TicketFilter, TicketStore};

type ApiResult<T> = Result<T, HelpdeskError>;

/// Assembles the server: managed state, routes and catchers.
pub fn build_rocket(config: Config, pool: SqlitePool) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.address))
        .merge(("port", config.port));

    rocket::custom(figment)
        .manage(TicketStore::new(&config))
        .manage(MetricsAggregator::new(&config))
        .manage(pool)
        .manage(config)
        .mount("/", routes![health])
        .mount(
            "/api/v1",
            routes![
                api_health,
                create_ticket,
                list_tickets,
                get_ticket,
                update_ticket,
                get_metrics
            ],
        )
        .register("/", catchers![not_found, internal_error, default_catcher])
}

fn body_error(err: json::Error<'_>) -> HelpdeskError {
    HelpdeskError::Validation(format!("Invalid request body: {}", err))
}

#[get("/health")]
fn health(config: &State<Config>) -> Json<api::Health> {
    Json(api::Health {
        status: "healthy",
        timestamp: Utc::now(),
        service: config.service_name.clone(),
    })
}

#[get("/health")]
async fn api_health(pool: &State<SqlitePool>) -> Json<api::ApiHealth> {
    let pool = pool.inner().clone();
    let database = match task::spawn_blocking(move || check_database(&pool)).await {
        Ok(Ok(())) => "connected".to_string(),
        Ok(Err(e)) => format!("error: {}", e),
        Err(e) => format!("error: {}", e),
    };

    Json(api::ApiHealth {
        status: "operational",
        database,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[post("/tickets", data = "<body>")]
async fn create_ticket(
    conn: DbConn,
    store: &State<TicketStore>,
    body: Result<Json<api::CreateTicket>, json::Error<'_>>,
) -> ApiResult<Custom<Json<api::CreatedTicket>>> {
    let request = body.map_err(body_error)?.into_inner();
    let store = store.inner().clone();
    let ticket_id = conn.run(move |c| store.create(c, &request)).await?;

    Ok(Custom(
        Status::Created,
        Json(api::CreatedTicket {
            message: "Ticket created successfully",
            ticket_id,
        }),
    ))
}

#[get("/tickets?<status>&<category>")]
async fn list_tickets(
    conn: DbConn,
    store: &State<TicketStore>,
    status: Option<String>,
    category: Option<String>,
) -> ApiResult<Json<api::TicketList>> {
    let filter = TicketFilter::new(status, category);
    let store = store.inner().clone();
    let tickets = conn.run(move |c| store.list(c, &filter)).await?;

    Ok(Json(api::TicketList {
        count: tickets.len(),
        tickets,
    }))
}

// A non-numeric id yields `None`, which the 404 catcher answers like any
// unmatched route.
#[get("/tickets/<id>")]
async fn get_ticket(
    conn: DbConn,
    store: &State<TicketStore>,
    id: Result<i32, &str>,
) -> Option<ApiResult<Json<Ticket>>> {
    let id = id.ok()?;
    let store = store.inner().clone();
    Some(conn.run(move |c| store.get(c, id)).await.map(Json))
}

#[put("/tickets/<id>", data = "<body>")]
async fn update_ticket(
    conn: DbConn,
    store: &State<TicketStore>,
    id: Result<i32, &str>,
    body: Result<Json<api::UpdateTicket>, json::Error<'_>>,
) -> Option<ApiResult<Json<api::Message>>> {
    let id = id.ok()?;
    let store = store.inner().clone();
    let updated = async move {
        // An unknown id is reported before a malformed body.
        let update = match body {
            Ok(update) => update.into_inner(),
            Err(err) => {
                let err = body_error(err);
                conn.run(move |c| store.ensure_exists(c, id)).await?;
                return Err(err);
            }
        };
        conn.run(move |c| store.update(c, id, &update)).await?;
        Ok::<_, HelpdeskError>(Json(api::Message {
            message: "Ticket updated successfully",
        }))
    };
    Some(updated.await)
}

#[get("/metrics")]
async fn get_metrics(
    conn: DbConn,
    aggregator: &State<MetricsAggregator>,
) -> ApiResult<Json<api::Metrics>> {
    let aggregator = aggregator.inner().clone();
    let snapshot = conn.run(move |c| aggregator.snapshot(c)).await?;

    Ok(Json(api::Metrics {
        total_tickets: snapshot.total,
        open_tickets: snapshot.open_count,
        tickets_by_category: snapshot.by_category,
        tickets_by_priority: snapshot.by_priority,
        timestamp: Utc::now(),
    }))
}

fn error_body<S: Into<String>>(status: Status, message: S) -> Custom<Json<api::ErrorBody>> {
    Custom(
        status,
        Json(api::ErrorBody {
            error: message.into(),
        }),
    )
}

#[catch(404)]
fn not_found() -> Custom<Json<api::ErrorBody>> {
    error_body(Status::NotFound, "Endpoint not found")
}

#[catch(500)]
fn internal_error(request: &Request<'_>) -> Custom<Json<api::ErrorBody>> {
    let failure = request.local_cache(CheckoutFailure::default);
    let message = failure
        .0
        .clone()
        .unwrap_or_else(|| "Internal server error".to_string());
    error_body(Status::InternalServerError, message)
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request<'_>) -> Custom<Json<api::ErrorBody>> {
    error_body(status, status.reason_lossy())
}
