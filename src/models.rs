use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_derive::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::api::{CreateTicket, UpdateTicket};
use crate::config::StatusPolicy;
use crate::error::HelpdeskError;
use crate::schema::{metrics, tickets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Network,
    Login,
    LabComputers,
    Software,
    Hardware,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Network,
        Category::Login,
        Category::LabComputers,
        Category::Software,
        Category::Hardware,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Network => "network",
            Category::Login => "login",
            Category::LabComputers => "lab_computers",
            Category::Software => "software",
            Category::Hardware => "hardware",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| invalid_choice("category", Category::ALL.iter().map(|c| c.as_str())))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .iter()
            .copied()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| invalid_choice("priority", Priority::ALL.iter().map(|p| p.as_str())))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses accepted under [`StatusPolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| invalid_choice("status", TicketStatus::ALL.iter().map(|s| s.as_str())))
    }
}

fn invalid_choice<'a, I>(field: &str, choices: I) -> HelpdeskError
where
    I: Iterator<Item = &'a str>,
{
    let choices: Vec<&str> = choices.collect();
    HelpdeskError::Validation(format!(
        "Invalid {}. Must be one of: {}",
        field,
        choices.join(", ")
    ))
}

/// A persisted ticket.
///
/// `status` and `priority` are kept as text: under the freeform policy an
/// update may store values outside the known sets.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Ticket {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub submitter_email: String,
    pub submitter_name: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub assigned_to: Option<String>,
    pub resolution_notes: Option<String>,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub submitter_email: String,
    pub submitter_name: String,
}

impl TicketDraft {
    /// Checks that every required field is present and non-blank, then that
    /// category and priority belong to their fixed sets.
    pub fn validate(request: &CreateTicket) -> Result<TicketDraft, HelpdeskError> {
        let required = [
            &request.title,
            &request.description,
            &request.category,
            &request.priority,
            &request.submitter_email,
            &request.submitter_name,
        ];
        let missing = required
            .iter()
            .any(|field| field.as_deref().map_or(true, |value| value.trim().is_empty()));
        if missing {
            return Err(HelpdeskError::Validation("Missing required fields".to_string()));
        }

        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        Ok(TicketDraft {
            category: field(&request.category).parse()?,
            priority: field(&request.priority).parse()?,
            title: field(&request.title),
            description: field(&request.description),
            submitter_email: field(&request.submitter_email),
            submitter_name: field(&request.submitter_name),
        })
    }

    pub fn to_insertable(&self, now: NaiveDateTime) -> NewTicket<'_> {
        NewTicket {
            title: &self.title,
            description: &self.description,
            category: self.category.as_str(),
            priority: self.priority.as_str(),
            submitter_email: &self.submitter_email,
            submitter_name: &self.submitter_name,
            status: TicketStatus::Open.as_str(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub priority: &'a str,
    pub submitter_email: &'a str,
    pub submitter_name: &'a str,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The columns an update may touch. `None` leaves a column alone.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct TicketChangeset {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Option<String>>,
    pub resolution_notes: Option<Option<String>>,
    pub updated_at: NaiveDateTime,
}

impl TicketChangeset {
    /// Returns `Ok(None)` when the update carries no accepted field.
    pub fn from_update(
        update: &UpdateTicket,
        policy: StatusPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<TicketChangeset>, HelpdeskError> {
        if update.is_empty() {
            return Ok(None);
        }

        if policy == StatusPolicy::Strict {
            if let Some(status) = &update.status {
                status.parse::<TicketStatus>()?;
            }
            if let Some(priority) = &update.priority {
                priority.parse::<Priority>()?;
            }
        }

        Ok(Some(TicketChangeset {
            status: update.status.clone(),
            priority: update.priority.clone(),
            assigned_to: update.assigned_to.clone(),
            resolution_notes: update.resolution_notes.clone(),
            updated_at: now,
        }))
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = metrics)]
pub struct NewMetricRecord<'a> {
    pub metric_type: &'a str,
    pub metric_value: i64,
    pub recorded_at: NaiveDateTime,
}
