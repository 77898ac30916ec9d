//! Live ticket counts for the dashboard.

use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::HelpdeskError;
use crate::models::{NewMetricRecord, TicketStatus};
use crate::schema::{metrics, tickets};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricSnapshot {
    pub total: i64,
    pub open_count: i64,
    /// Only values that occur in at least one ticket are present.
    pub by_category: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    record_snapshots: bool,
}

impl MetricsAggregator {
    pub fn new(config: &Config) -> MetricsAggregator {
        MetricsAggregator {
            record_snapshots: config.record_snapshots,
        }
    }

    /// Counts every ticket. All four figures come from one transaction, which
    /// is opened IMMEDIATE because it may append audit rows after reading.
    pub fn snapshot(&self, conn: &mut SqliteConnection) -> Result<MetricSnapshot, HelpdeskError> {
        let record = self.record_snapshots;
        conn.immediate_transaction::<_, HelpdeskError, _>(|conn| {
            let total = tickets::table.count().get_result::<i64>(conn)?;
            let open_count = tickets::table
                .filter(tickets::status.eq(TicketStatus::Open.as_str()))
                .count()
                .get_result::<i64>(conn)?;

            let by_category: BTreeMap<String, i64> = tickets::table
                .group_by(tickets::category)
                .select((tickets::category, count_star()))
                .load::<(String, i64)>(conn)?
                .into_iter()
                .collect();
            let by_priority: BTreeMap<String, i64> = tickets::table
                .group_by(tickets::priority)
                .select((tickets::priority, count_star()))
                .load::<(String, i64)>(conn)?
                .into_iter()
                .collect();

            if record {
                let recorded_at = Utc::now().naive_utc();
                let rows = vec![
                    NewMetricRecord {
                        metric_type: "total_tickets",
                        metric_value: total,
                        recorded_at,
                    },
                    NewMetricRecord {
                        metric_type: "open_tickets",
                        metric_value: open_count,
                        recorded_at,
                    },
                ];
                diesel::insert_into(metrics::table)
                    .values(&rows)
                    .execute(conn)?;
            }

            info!("Metrics retrieved for dashboard");
            Ok(MetricSnapshot {
                total,
                open_count,
                by_category,
                by_priority,
            })
        })
    }
}
