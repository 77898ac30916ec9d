//! JSON bodies accepted and returned by the HTTP surface.

use chrono::{DateTime, Utc};
use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Ticket;

/// Body of `POST /api/v1/tickets`. Every field is optional here so that a
/// missing field is reported as a validation failure rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTicket {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub submitter_email: Option<String>,
    pub submitter_name: Option<String>,
}

/// Body of `PUT /api/v1/tickets/<id>`. Unknown fields are ignored.
///
/// `assigned_to` and `resolution_notes` distinguish an absent key (`None`)
/// from an explicit `null` (`Some(None)`), which clears the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTicket {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub resolution_notes: Option<Option<String>>,
}

impl UpdateTicket {
    /// True when none of the accepted fields was supplied.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.resolution_notes.is_none()
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(Some(value))
}

#[derive(Debug, Serialize)]
pub struct CreatedTicket {
    pub message: &'static str,
    pub ticket_id: i32,
}

#[derive(Debug, Serialize)]
pub struct TicketList {
    pub count: usize,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Metrics {
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub tickets_by_category: BTreeMap<String, i64>,
    pub tickets_by_priority: BTreeMap<String, i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct ApiHealth {
    pub status: &'static str,
    pub database: String,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
