//! PostgreSQL-backed `AnalyticsStore`
//!
//! Typed SeaORM queries for row access, raw statements where the query
//! needs `FILTER`, `ON CONFLICT` or multi-table `DELETE ... USING`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    prelude::DateTimeWithTimeZone, sea_query::Expr, ActiveModelTrait, ColumnTrait,
    ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::analytics::benchmark::AppStats;
use crate::db::models::*;
use crate::db::store::{start_of_day, AnalyticsStore, AppProjection, ExpiredCounts, NewEvent};
use crate::db::DbPool;
use crate::errors::Result;
use crate::plans::Plan;

/// Users per `IN (...)` list when resolving first-seen days
const FIRST_SEEN_BATCH: usize = 1000;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

fn project((app, org): (App, Option<Org>)) -> Option<AppProjection> {
    let org = org?;
    Some(AppProjection {
        plan: org.plan(),
        org_name: org.name,
        app,
    })
}

#[async_trait]
impl AnalyticsStore for Repository {
    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // App / Org Lookups
    // ========================================================================

    async fn find_app_by_key_hash(&self, key_hash: &str) -> Result<Option<AppProjection>> {
        let found = AppEntity::find()
            .filter(AppColumn::WriteKeyHash.eq(key_hash))
            .filter(AppColumn::IsActive.eq(true))
            .find_also_related(OrgEntity)
            .one(self.read_conn())
            .await?;

        Ok(found.and_then(project))
    }

    async fn find_app(&self, app_id: Uuid) -> Result<Option<AppProjection>> {
        let found = AppEntity::find_by_id(app_id)
            .find_also_related(OrgEntity)
            .one(self.read_conn())
            .await?;

        Ok(found.and_then(project))
    }

    async fn is_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool> {
        let count = OrgMemberEntity::find()
            .filter(OrgMemberColumn::OrgId.eq(org_id))
            .filter(OrgMemberColumn::UserId.eq(user_id))
            .count(self.read_conn())
            .await?;

        Ok(count > 0)
    }

    // ========================================================================
    // Event Writes
    // ========================================================================

    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        let kind = event.event_type;
        let date = event.timestamp.date_naive();

        let row = EventActiveModel {
            id: Set(Uuid::new_v4()),
            app_id: Set(event.app_id),
            event_type: Set(kind.as_str().to_string()),
            event_name: Set(event.event_name),
            properties: Set(event.properties),
            prompt_hash: Set(event.prompt_hash),
            user_hash: Set(event.user_hash),
            error_message: Set(event.error_message),
            latency_ms: Set(event.latency_ms),
            revenue: Set(event.revenue),
            currency: Set(event.currency),
            timestamp: Set(event.timestamp.into()),
        };

        let txn = self.write_conn().begin().await?;

        let stored = row.insert(&txn).await?;

        if kind.is_funnel_step() {
            let (invoked, completed, converted): (i64, i64, i64) = match kind {
                EventType::Invoked => (1, 0, 0),
                EventType::Completed => (0, 1, 0),
                _ => (0, 0, 1),
            };

            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO daily_metrics (app_id, date, invoked, completed, converted, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (app_id, date) DO UPDATE SET
                    invoked = daily_metrics.invoked + EXCLUDED.invoked,
                    completed = daily_metrics.completed + EXCLUDED.completed,
                    converted = daily_metrics.converted + EXCLUDED.converted,
                    updated_at = NOW()
                "#,
                vec![
                    stored.app_id.into(),
                    date.into(),
                    invoked.into(),
                    completed.into(),
                    converted.into(),
                ],
            );

            txn.execute(stmt).await?;
        }

        txn.commit().await?;

        Ok(stored)
    }

    // ========================================================================
    // Dashboard Reads
    // ========================================================================

    async fn events_in_range(
        &self,
        app_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        EventEntity::find()
            .filter(EventColumn::AppId.eq(app_id))
            .filter(EventColumn::Timestamp.gte(from))
            .filter(EventColumn::Timestamp.lt(to))
            .order_by_asc(EventColumn::Timestamp)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn first_seen(
        &self,
        app_id: Uuid,
        user_hashes: &[String],
        before: DateTime<Utc>,
    ) -> Result<HashMap<String, NaiveDate>> {
        let mut first = HashMap::with_capacity(user_hashes.len());

        for chunk in user_hashes.chunks(FIRST_SEEN_BATCH) {
            let rows: Vec<(String, DateTimeWithTimeZone)> = EventEntity::find()
                .select_only()
                .column(EventColumn::UserHash)
                .column_as(Expr::col(EventColumn::Timestamp).min(), "first_seen")
                .filter(EventColumn::AppId.eq(app_id))
                .filter(EventColumn::UserHash.is_in(chunk.iter().cloned()))
                .filter(EventColumn::Timestamp.lt(before))
                .group_by(EventColumn::UserHash)
                .into_tuple()
                .all(self.read_conn())
                .await?;

            first.extend(
                rows.into_iter()
                    .map(|(user, ts)| (user, ts.with_timezone(&Utc).date_naive())),
            );
        }

        Ok(first)
    }

    async fn daily_metrics(
        &self,
        app_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>> {
        DailyMetricEntity::find()
            .filter(DailyMetricColumn::AppId.eq(app_id))
            .filter(DailyMetricColumn::Date.between(from, to))
            .order_by_asc(DailyMetricColumn::Date)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn category_app_stats(
        &self,
        category: AppCategory,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AppStats>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                a.id,
                COUNT(e.id) AS total_events,
                COUNT(e.id) FILTER (WHERE e.event_type = 'invoked') AS invoked,
                COUNT(e.id) FILTER (WHERE e.event_type = 'completed') AS completed,
                COUNT(e.id) FILTER (WHERE e.event_type = 'converted') AS converted,
                COUNT(e.id) FILTER (WHERE e.event_type = 'error') AS errors,
                COALESCE(SUM(e.latency_ms), 0)::float8 AS latency_sum_ms,
                COUNT(e.latency_ms) AS latency_samples
            FROM apps a
            LEFT JOIN events e
                ON e.app_id = a.id
                AND e.timestamp >= $2
                AND e.timestamp < $3
            WHERE a.category = $1 AND a.is_active
            GROUP BY a.id
            "#,
            vec![category.as_str().into(), from.into(), to.into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            stats.push(AppStats {
                app_id: row.try_get_by_index::<Uuid>(0)?,
                total_events: row.try_get_by_index::<i64>(1)? as u64,
                invoked: row.try_get_by_index::<i64>(2)? as u64,
                completed: row.try_get_by_index::<i64>(3)? as u64,
                converted: row.try_get_by_index::<i64>(4)? as u64,
                errors: row.try_get_by_index::<i64>(5)? as u64,
                latency_sum_ms: row.try_get_by_index::<f64>(6)?,
                latency_samples: row.try_get_by_index::<i64>(7)? as u64,
            });
        }

        Ok(stats)
    }

    // ========================================================================
    // Retention
    // ========================================================================

    async fn count_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts> {
        let cutoff_date = cutoff.date_naive();
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                (SELECT COUNT(*)
                   FROM events e
                   JOIN apps a ON a.id = e.app_id
                   JOIN orgs o ON o.id = a.org_id
                  WHERE o.plan = $1 AND e.timestamp < $2) AS events,
                (SELECT COUNT(*)
                   FROM daily_metrics d
                   JOIN apps a ON a.id = d.app_id
                   JOIN orgs o ON o.id = a.org_id
                  WHERE o.plan = $1 AND d.date < $3) AS daily_metrics
            "#,
            vec![plan.as_str().into(), start_of_day(cutoff_date).into(), cutoff_date.into()],
        );

        let counts = match self.read_conn().query_one(stmt).await? {
            Some(row) => ExpiredCounts {
                events: row.try_get_by_index::<i64>(0)? as u64,
                daily_metrics: row.try_get_by_index::<i64>(1)? as u64,
            },
            None => ExpiredCounts::default(),
        };

        Ok(counts)
    }

    async fn delete_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts> {
        let cutoff_date = cutoff.date_naive();
        let txn = self.write_conn().begin().await?;

        let events = txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                DELETE FROM events e
                 USING apps a, orgs o
                 WHERE e.app_id = a.id
                   AND a.org_id = o.id
                   AND o.plan = $1
                   AND e.timestamp < $2
                "#,
                vec![plan.as_str().into(), start_of_day(cutoff_date).into()],
            ))
            .await?
            .rows_affected();

        let daily_metrics = txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                DELETE FROM daily_metrics d
                 USING apps a, orgs o
                 WHERE d.app_id = a.id
                   AND a.org_id = o.id
                   AND o.plan = $1
                   AND d.date < $2
                "#,
                vec![plan.as_str().into(), cutoff_date.into()],
            ))
            .await?
            .rows_affected();

        txn.commit().await?;

        Ok(ExpiredCounts { events, daily_metrics })
    }
}
