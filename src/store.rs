//! Persistence of tickets: create, fetch, filtered listing and partial update.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;

use crate::api::{CreateTicket, UpdateTicket};
use crate::config::{Config, StatusPolicy};
use crate::error::HelpdeskError;
use crate::models::{Ticket, TicketChangeset, TicketDraft};
use crate::schema::tickets;

/// Optional equality filters for [`TicketStore::list`]. Empty strings are
/// treated as absent.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub category: Option<String>,
}

impl TicketFilter {
    pub fn new(status: Option<String>, category: Option<String>) -> TicketFilter {
        let keep = |value: Option<String>| value.filter(|v| !v.is_empty());
        TicketFilter {
            status: keep(status),
            category: keep(category),
        }
    }
}

/// Result of [`TicketStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No accepted field was present; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct TicketStore {
    status_policy: StatusPolicy,
}

impl TicketStore {
    pub fn new(config: &Config) -> TicketStore {
        TicketStore {
            status_policy: config.status_policy,
        }
    }

    pub fn create(
        &self,
        conn: &mut SqliteConnection,
        request: &CreateTicket,
    ) -> Result<i32, HelpdeskError> {
        let draft = TicketDraft::validate(request)?;
        let row = draft.to_insertable(now());

        let id = diesel::insert_into(tickets::table)
            .values(&row)
            .returning(tickets::id)
            .get_result::<i32>(conn)?;

        info!(
            "Ticket created: ID={}, Category={}, Priority={}",
            id, draft.category, draft.priority
        );
        Ok(id)
    }

    pub fn get(&self, conn: &mut SqliteConnection, id: i32) -> Result<Ticket, HelpdeskError> {
        let ticket: Ticket = tickets::table
            .find(id)
            .select(Ticket::as_select())
            .first(conn)
            .optional()?
            .ok_or(HelpdeskError::NotFound(id))?;

        info!("Retrieved ticket: ID={}", id);
        Ok(ticket)
    }

    /// Newest first; tickets created in the same instant come out by
    /// descending id.
    pub fn list(
        &self,
        conn: &mut SqliteConnection,
        filter: &TicketFilter,
    ) -> Result<Vec<Ticket>, HelpdeskError> {
        let mut query = tickets::table.select(Ticket::as_select()).into_boxed();
        if let Some(status) = filter.status.as_deref() {
            query = query.filter(tickets::status.eq(status));
        }
        if let Some(category) = filter.category.as_deref() {
            query = query.filter(tickets::category.eq(category));
        }

        let found: Vec<Ticket> = query
            .order((tickets::created_at.desc(), tickets::id.desc()))
            .load(conn)?;

        info!(
            "Retrieved {} tickets with filters: status={:?}, category={:?}",
            found.len(),
            filter.status,
            filter.category
        );
        Ok(found)
    }

    /// Fails with [`HelpdeskError::NotFound`] unless the ticket exists.
    pub fn ensure_exists(&self, conn: &mut SqliteConnection, id: i32) -> Result<(), HelpdeskError> {
        let exists = diesel::select(diesel::dsl::exists(tickets::table.find(id)))
            .get_result::<bool>(conn)?;
        if exists {
            Ok(())
        } else {
            Err(HelpdeskError::NotFound(id))
        }
    }

    pub fn update(
        &self,
        conn: &mut SqliteConnection,
        id: i32,
        update: &UpdateTicket,
    ) -> Result<UpdateOutcome, HelpdeskError> {
        let policy = self.status_policy;
        // IMMEDIATE takes the write lock up front; a deferred read-then-write
        // fails with SQLITE_BUSY_SNAPSHOT when another writer commits first.
        conn.immediate_transaction::<_, HelpdeskError, _>(|conn| {
            self.ensure_exists(conn, id)?;

            let changeset = match TicketChangeset::from_update(update, policy, now())? {
                Some(changeset) => changeset,
                None => return Ok(UpdateOutcome::Unchanged),
            };

            diesel::update(tickets::table.find(id))
                .set(&changeset)
                .execute(conn)?;

            info!("Ticket updated: ID={}, Updates={:?}", id, changeset);
            Ok(UpdateOutcome::Applied)
        })
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db_connection::run_migrations;
    use diesel::Connection;
    use std::thread;
    use std::time::Duration;

    pub(crate) fn memory_connection() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    pub(crate) fn ticket(category: &str, priority: &str) -> CreateTicket {
        CreateTicket {
            title: Some("Network connectivity issue".into()),
            description: Some("Cannot access university network".into()),
            category: Some(category.into()),
            priority: Some(priority.into()),
            submitter_email: Some("student@university.edu".into()),
            submitter_name: Some("John Doe".into()),
        }
    }

    fn store() -> TicketStore {
        TicketStore::new(&Config::default())
    }

    #[test]
    fn create_then_get_round_trips_fields() {
        let mut conn = memory_connection();
        let store = store();

        let id = store.create(&mut conn, &ticket("network", "high")).unwrap();
        let found = store.get(&mut conn, id).unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.status, "open");
        assert_eq!(found.title, "Network connectivity issue");
        assert_eq!(found.description, "Cannot access university network");
        assert_eq!(found.category, "network");
        assert_eq!(found.priority, "high");
        assert_eq!(found.submitter_email, "student@university.edu");
        assert_eq!(found.submitter_name, "John Doe");
        assert_eq!(found.created_at, found.updated_at);
        assert_eq!(found.assigned_to, None);
        assert_eq!(found.resolution_notes, None);
    }

    #[test]
    fn ids_are_fresh_and_increasing() {
        let mut conn = memory_connection();
        let store = store();

        let first = store.create(&mut conn, &ticket("network", "high")).unwrap();
        let second = store.create(&mut conn, &ticket("login", "low")).unwrap();
        assert_eq!(first, 1);
        assert!(second > first);
    }

    #[test]
    fn invalid_create_persists_nothing() {
        let mut conn = memory_connection();
        let store = store();

        let mut missing = ticket("network", "high");
        missing.description = None;
        assert!(matches!(
            store.create(&mut conn, &missing),
            Err(HelpdeskError::Validation(_))
        ));
        assert!(matches!(
            store.create(&mut conn, &ticket("bogus", "high")),
            Err(HelpdeskError::Validation(_))
        ));
        assert!(matches!(
            store.create(&mut conn, &ticket("network", "bogus")),
            Err(HelpdeskError::Validation(_))
        ));

        let all = store.list(&mut conn, &TicketFilter::default()).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let mut conn = memory_connection();
        assert!(matches!(
            store().get(&mut conn, 99999),
            Err(HelpdeskError::NotFound(99999))
        ));
    }

    #[test]
    fn list_orders_newest_first_and_filters() {
        let mut conn = memory_connection();
        let store = store();

        let a = store.create(&mut conn, &ticket("network", "high")).unwrap();
        thread::sleep(Duration::from_millis(5));
        let b = store.create(&mut conn, &ticket("software", "low")).unwrap();
        thread::sleep(Duration::from_millis(5));
        let c = store.create(&mut conn, &ticket("network", "medium")).unwrap();

        let update = UpdateTicket {
            status: Some("closed".into()),
            ..UpdateTicket::default()
        };
        store.update(&mut conn, c, &update).unwrap();

        let all = store.list(&mut conn, &TicketFilter::default()).unwrap();
        let ids: Vec<i32> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![c, b, a]);

        let open = store
            .list(&mut conn, &TicketFilter::new(Some("open".into()), None))
            .unwrap();
        let ids: Vec<i32> = open.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b, a]);

        let open_network = store
            .list(
                &mut conn,
                &TicketFilter::new(Some("open".into()), Some("network".into())),
            )
            .unwrap();
        let ids: Vec<i32> = open_network.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a]);

        let unknown = store
            .list(&mut conn, &TicketFilter::new(None, Some("bogus".into())))
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[test]
    fn empty_filter_values_match_everything() {
        let mut conn = memory_connection();
        let store = store();
        store.create(&mut conn, &ticket("network", "high")).unwrap();

        let filter = TicketFilter::new(Some(String::new()), Some(String::new()));
        assert_eq!(filter.status, None);
        assert_eq!(store.list(&mut conn, &filter).unwrap().len(), 1);
    }

    #[test]
    fn update_sets_fields_and_refreshes_timestamp() {
        let mut conn = memory_connection();
        let store = store();
        let id = store.create(&mut conn, &ticket("hardware", "low")).unwrap();
        thread::sleep(Duration::from_millis(5));

        let update = UpdateTicket {
            status: Some("resolved".into()),
            assigned_to: Some(Some("X".into())),
            resolution_notes: Some(Some("Y".into())),
            ..UpdateTicket::default()
        };
        assert_eq!(
            store.update(&mut conn, id, &update).unwrap(),
            UpdateOutcome::Applied
        );

        let found = store.get(&mut conn, id).unwrap();
        assert_eq!(found.status, "resolved");
        assert_eq!(found.assigned_to.as_deref(), Some("X"));
        assert_eq!(found.resolution_notes.as_deref(), Some("Y"));
        assert_eq!(found.priority, "low");
        assert!(found.updated_at > found.created_at);
    }

    #[test]
    fn update_with_same_value_still_refreshes_timestamp() {
        let mut conn = memory_connection();
        let store = store();
        let id = store.create(&mut conn, &ticket("hardware", "low")).unwrap();
        let before = store.get(&mut conn, id).unwrap();
        thread::sleep(Duration::from_millis(5));

        let update = UpdateTicket {
            status: Some("open".into()),
            ..UpdateTicket::default()
        };
        store.update(&mut conn, id, &update).unwrap();

        let after = store.get(&mut conn, id).unwrap();
        assert_eq!(after.status, "open");
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn update_without_accepted_fields_is_a_noop() {
        let mut conn = memory_connection();
        let store = store();
        let id = store.create(&mut conn, &ticket("hardware", "low")).unwrap();
        let before = store.get(&mut conn, id).unwrap();
        thread::sleep(Duration::from_millis(5));

        assert_eq!(
            store.update(&mut conn, id, &UpdateTicket::default()).unwrap(),
            UpdateOutcome::Unchanged
        );
        assert_eq!(store.get(&mut conn, id).unwrap(), before);
    }

    #[test]
    fn null_clears_assignee() {
        let mut conn = memory_connection();
        let store = store();
        let id = store.create(&mut conn, &ticket("login", "medium")).unwrap();

        let assign = UpdateTicket {
            assigned_to: Some(Some("Admin User".into())),
            ..UpdateTicket::default()
        };
        store.update(&mut conn, id, &assign).unwrap();

        let clear = UpdateTicket {
            assigned_to: Some(None),
            ..UpdateTicket::default()
        };
        store.update(&mut conn, id, &clear).unwrap();

        assert_eq!(store.get(&mut conn, id).unwrap().assigned_to, None);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let mut conn = memory_connection();
        let update = UpdateTicket {
            status: Some("closed".into()),
            ..UpdateTicket::default()
        };
        assert!(matches!(
            store().update(&mut conn, 42, &update),
            Err(HelpdeskError::NotFound(42))
        ));
        assert!(matches!(
            store().update(&mut conn, 42, &UpdateTicket::default()),
            Err(HelpdeskError::NotFound(42))
        ));
    }

    #[test]
    fn strict_policy_rejects_unknown_status_without_writing() {
        let mut conn = memory_connection();
        let config = Config {
            status_policy: StatusPolicy::Strict,
            ..Config::default()
        };
        let store = TicketStore::new(&config);
        let id = store.create(&mut conn, &ticket("software", "medium")).unwrap();

        let update = UpdateTicket {
            status: Some("bogus".into()),
            assigned_to: Some(Some("Admin User".into())),
            ..UpdateTicket::default()
        };
        assert!(matches!(
            store.update(&mut conn, id, &update),
            Err(HelpdeskError::Validation(_))
        ));

        let found = store.get(&mut conn, id).unwrap();
        assert_eq!(found.status, "open");
        assert_eq!(found.assigned_to, None);
    }

    #[test]
    fn freeform_policy_stores_any_status() {
        let mut conn = memory_connection();
        let store = store();
        let id = store.create(&mut conn, &ticket("software", "medium")).unwrap();

        let update = UpdateTicket {
            status: Some("waiting on vendor".into()),
            priority: Some("urgent".into()),
            ..UpdateTicket::default()
        };
        store.update(&mut conn, id, &update).unwrap();

        let found = store.get(&mut conn, id).unwrap();
        assert_eq!(found.status, "waiting on vendor");
        assert_eq!(found.priority, "urgent");
    }

    #[test]
    fn concurrent_updates_through_a_pool_all_succeed() {
        use crate::db_connection::{init_db_connection_pool, run_pending_migrations};
        use crate::metrics::MetricsAggregator;

        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            pool_size: 8,
            record_snapshots: true,
            ..Config::with_database_url(dir.path().join("tickets.db").to_string_lossy())
        };
        let pool = init_db_connection_pool(&config).unwrap();
        run_pending_migrations(&pool).unwrap();

        let store = TicketStore::new(&config);
        let id = store
            .create(&mut pool.get().unwrap(), &ticket("network", "high"))
            .unwrap();

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let pool = pool.clone();
                let store = store.clone();
                let aggregator = MetricsAggregator::new(&config);
                thread::spawn(move || {
                    let mut failures = Vec::new();
                    for round in 0..100 {
                        let mut conn = pool.get().unwrap();
                        let update = UpdateTicket {
                            status: Some(format!("worker-{}", worker)),
                            ..UpdateTicket::default()
                        };
                        if let Err(e) = store.update(&mut conn, id, &update) {
                            failures.push(e.to_string());
                        }
                        if round % 10 == 0 {
                            if let Err(e) = aggregator.snapshot(&mut conn) {
                                failures.push(e.to_string());
                            }
                        }
                    }
                    failures
                })
            })
            .collect();

        let failures: Vec<String> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        assert!(failures.is_empty(), "{} failures, first: {:?}", failures.len(), failures.first());

        let found = store.get(&mut pool.get().unwrap(), id).unwrap();
        assert!(found.status.starts_with("worker-"), "{}", found.status);
    }
}
