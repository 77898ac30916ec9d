//! Error type shared by the store, the aggregator and the HTTP layer.

use log::error;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use thiserror::Error;

use crate::api::ErrorBody;

#[derive(Error, Debug)]
pub enum HelpdeskError {
    /// Missing or invalid input.
    #[error("{0}")]
    Validation(String),

    #[error("Ticket not found")]
    NotFound(i32),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HelpdeskError {
    pub fn status(&self) -> Status {
        match self {
            HelpdeskError::Validation(_) => Status::BadRequest,
            HelpdeskError::NotFound(_) => Status::NotFound,
            HelpdeskError::Database(_)
            | HelpdeskError::Pool(_)
            | HelpdeskError::Migration(_)
            | HelpdeskError::Io(_)
            | HelpdeskError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for HelpdeskError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!("{} {}: {}", request.method(), request.uri(), self);
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).respond_to(request)
    }
}
