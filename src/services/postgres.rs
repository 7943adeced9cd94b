use crate::core::{plan_opt_in, plan_opt_out, MatchOutcome, MatchingPipeline};
use crate::error::CircleError;
use crate::models::{Circle, CircleMember, Course, Event, EventFormat, MatchingStatus, OptInAttributes, OptInRecord, PartnerRef, Role};
use crate::services::store::EventStore;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const OPT_IN_COLUMNS: &str = r#"
    event_id, user_id, partner_user_id, hosting_available, dietary_restrictions,
    interests, match_address, course_preference, created_at
"#;

/// PostgreSQL-backed store
///
/// The event row is the contention point: opt-in and opt-out take it with
/// `SELECT ... FOR UPDATE`, and the trigger claims it with a conditional
/// `UPDATE ... WHERE matching_status = 'open'`. The whole trigger runs in one
/// transaction, so a failure or crash rolls the status back to `open`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, CircleError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, CircleError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_event(
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
    ) -> Result<Event, CircleError> {
        let row = sqlx::query(
            r#"
            SELECT id, format, matching_status, minimum_pool_size, circle_size
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CircleError::EventNotFound(event_id))?;

        event_from_row(&row)
    }

    async fn fetch_opt_in(
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<OptInRecord>, CircleError> {
        let query = format!(
            "SELECT {} FROM opt_ins WHERE event_id = $1 AND user_id = $2 FOR UPDATE",
            OPT_IN_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(opt_in_from_row).transpose()
    }

    async fn insert_opt_in(
        tx: &mut Transaction<'_, Postgres>,
        record: &OptInRecord,
    ) -> Result<(), CircleError> {
        let query = format!(
            "INSERT INTO opt_ins ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            OPT_IN_COLUMNS
        );

        sqlx::query(&query)
            .bind(record.event_id)
            .bind(&record.user_id)
            .bind(&record.partner_user_id)
            .bind(record.attributes.hosting_available)
            .bind(record.attributes.dietary_restrictions.iter().cloned().collect::<Vec<_>>())
            .bind(record.attributes.interests.iter().cloned().collect::<Vec<_>>())
            .bind(&record.attributes.match_address)
            .bind(record.attributes.course_preference)
            .bind(record.created_at)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn insert_circle(
        tx: &mut Transaction<'_, Postgres>,
        circle: &Circle,
        position: i32,
    ) -> Result<(), CircleError> {
        sqlx::query(
            r#"
            INSERT INTO circles (id, event_id, format, is_overflow, needs_host, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(circle.id)
        .bind(circle.event_id)
        .bind(circle.format)
        .bind(circle.is_overflow)
        .bind(circle.needs_host)
        .bind(position)
        .execute(&mut **tx)
        .await?;

        for (member_position, member) in circle.members.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO circle_members (
                    circle_id, event_id, user_id, role, partner_user_id,
                    dietary_restrictions, interests, match_address, position
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(circle.id)
            .bind(circle.event_id)
            .bind(&member.user_id)
            .bind(member.role)
            .bind(&member.partner_user_id)
            .bind(member.dietary_restrictions.iter().cloned().collect::<Vec<_>>())
            .bind(member.interests.iter().cloned().collect::<Vec<_>>())
            .bind(&member.match_address)
            .bind(member_position as i32)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn create_event(&self, event: &Event) -> Result<(), CircleError> {
        sqlx::query(
            r#"
            INSERT INTO events (id, format, matching_status, minimum_pool_size, circle_size)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.format)
        .bind(event.matching_status)
        .bind(event.minimum_pool_size as i32)
        .bind(event.circle_size as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Event, CircleError> {
        let row = sqlx::query(
            r#"
            SELECT id, format, matching_status, minimum_pool_size, circle_size
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CircleError::EventNotFound(event_id))?;

        event_from_row(&row)
    }

    async fn resolve_user(&self, partner: &PartnerRef) -> Result<Option<String>, CircleError> {
        let row = match partner {
            PartnerRef::UserId(id) => {
                sqlx::query("SELECT id FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            PartnerRef::Email(email) => {
                sqlx::query("SELECT id FROM users WHERE lower(email) = lower($1)")
                    .bind(email)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.map(|r| r.try_get("id")).transpose().map_err(Into::into)
    }

    async fn apply_opt_in(
        &self,
        event_id: Uuid,
        record: OptInRecord,
        partner_id: Option<String>,
    ) -> Result<OptInRecord, CircleError> {
        let mut tx = self.pool.begin().await?;

        let event = Self::lock_event(&mut tx, event_id).await?;
        let existing = Self::fetch_opt_in(&mut tx, event_id, &record.user_id).await?;
        let partner_record = match &partner_id {
            Some(id) => Self::fetch_opt_in(&mut tx, event_id, id).await?,
            None => None,
        };

        let plan = plan_opt_in(
            &event,
            existing.as_ref(),
            partner_id.as_deref().map(|id| (id, partner_record.as_ref())),
            record,
        )?;

        for inserted in plan.inserts() {
            Self::insert_opt_in(&mut tx, inserted).await?;
        }

        if let Some(partner_id) = &plan.link_partner {
            sqlx::query(
                r#"
                UPDATE opt_ins
                SET partner_user_id = $3
                WHERE event_id = $1 AND user_id = $2 AND partner_user_id IS NULL
                "#,
            )
            .bind(event_id)
            .bind(partner_id)
            .bind(&plan.record.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Recorded opt-in: {} -> event {} (partner: {:?})",
            plan.record.user_id,
            event_id,
            plan.record.partner_user_id
        );

        Ok(plan.record)
    }

    async fn apply_opt_out(&self, event_id: Uuid, user_id: &str) -> Result<Vec<String>, CircleError> {
        let mut tx = self.pool.begin().await?;

        let event = Self::lock_event(&mut tx, event_id).await?;
        let existing = Self::fetch_opt_in(&mut tx, event_id, user_id).await?;
        let removed = plan_opt_out(&event, user_id, existing.as_ref())?;

        sqlx::query("DELETE FROM opt_ins WHERE event_id = $1 AND user_id = ANY($2)")
            .bind(event_id)
            .bind(&removed)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(removed)
    }

    async fn find_opt_in(&self, event_id: Uuid, user_id: &str) -> Result<Option<OptInRecord>, CircleError> {
        let query = format!(
            "SELECT {} FROM opt_ins WHERE event_id = $1 AND user_id = $2",
            OPT_IN_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(opt_in_from_row).transpose()
    }

    async fn list_pool(&self, event_id: Uuid) -> Result<Vec<OptInRecord>, CircleError> {
        let query = format!(
            "SELECT {} FROM opt_ins WHERE event_id = $1 ORDER BY user_id",
            OPT_IN_COLUMNS
        );

        let rows = sqlx::query(&query).bind(event_id).fetch_all(&self.pool).await?;
        rows.iter().map(opt_in_from_row).collect()
    }

    async fn pool_count(&self, event_id: Uuid) -> Result<usize, CircleError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opt_ins WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    async fn run_matching(
        &self,
        event_id: Uuid,
        pipeline: &MatchingPipeline,
    ) -> Result<MatchOutcome, CircleError> {
        let mut tx = self.pool.begin().await?;

        // Conditional write: exactly one caller moves the row out of `open`
        let claimed = sqlx::query(
            r#"
            UPDATE events
            SET matching_status = 'matching', updated_at = NOW()
            WHERE id = $1 AND matching_status = 'open'
            RETURNING id, format, matching_status, minimum_pool_size, circle_size
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let event = match claimed {
            Some(row) => event_from_row(&row)?,
            None => {
                tx.rollback().await?;
                // Distinguish a missing event from a lost race
                self.get_event(event_id).await?;
                return Err(CircleError::AlreadyTriggered(event_id));
            }
        };

        let query = format!(
            "SELECT {} FROM opt_ins WHERE event_id = $1 ORDER BY user_id",
            OPT_IN_COLUMNS
        );
        let rows = sqlx::query(&query).bind(event_id).fetch_all(&mut *tx).await?;
        let snapshot = rows.iter().map(opt_in_from_row).collect::<Result<Vec<_>, _>>()?;

        let outcome = match pipeline.run(&event, snapshot) {
            Ok(outcome) => outcome,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        for (position, circle) in outcome.circles.iter().enumerate() {
            Self::insert_circle(&mut tx, circle, position as i32).await?;
        }

        sqlx::query("DELETE FROM opt_ins WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        let closed = sqlx::query(
            r#"
            UPDATE events
            SET matching_status = 'closed', updated_at = NOW()
            WHERE id = $1 AND matching_status = 'matching'
            "#,
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() != 1 {
            return Err(CircleError::Internal(format!(
                "event {} left the matching state mid-trigger",
                event_id
            )));
        }

        tx.commit().await?;

        Ok(outcome)
    }

    async fn list_circles(&self, event_id: Uuid) -> Result<Vec<Circle>, CircleError> {
        let circle_rows = sqlx::query(
            r#"
            SELECT id, event_id, format, is_overflow, needs_host
            FROM circles
            WHERE event_id = $1
            ORDER BY position
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let member_rows = sqlx::query(
            r#"
            SELECT circle_id, user_id, role, partner_user_id, dietary_restrictions, interests, match_address
            FROM circle_members
            WHERE event_id = $1
            ORDER BY circle_id, position
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<Uuid, Vec<CircleMember>> = HashMap::new();
        for row in &member_rows {
            let member = CircleMember {
                circle_id: row.try_get("circle_id")?,
                user_id: row.try_get("user_id")?,
                role: row.try_get::<Role, _>("role")?,
                partner_user_id: row.try_get("partner_user_id")?,
                dietary_restrictions: row.try_get::<Vec<String>, _>("dietary_restrictions")?.into_iter().collect(),
                interests: row.try_get::<Vec<String>, _>("interests")?.into_iter().collect(),
                match_address: row.try_get("match_address")?,
            };
            members.entry(member.circle_id).or_default().push(member);
        }

        circle_rows
            .iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                Ok(Circle {
                    id,
                    event_id: row.try_get("event_id")?,
                    format: row.try_get::<EventFormat, _>("format")?,
                    is_overflow: row.try_get("is_overflow")?,
                    needs_host: row.try_get("needs_host")?,
                    members: members.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, CircleError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn event_from_row(row: &PgRow) -> Result<Event, CircleError> {
    let minimum_pool_size: i32 = row.try_get("minimum_pool_size")?;
    let circle_size: i32 = row.try_get("circle_size")?;

    Ok(Event {
        id: row.try_get("id")?,
        format: row.try_get::<EventFormat, _>("format")?,
        matching_status: row.try_get::<MatchingStatus, _>("matching_status")?,
        minimum_pool_size: minimum_pool_size.max(0) as usize,
        circle_size: circle_size.max(0) as usize,
    })
}

fn opt_in_from_row(row: &PgRow) -> Result<OptInRecord, CircleError> {
    Ok(OptInRecord {
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        partner_user_id: row.try_get("partner_user_id")?,
        attributes: OptInAttributes {
            hosting_available: row.try_get("hosting_available")?,
            dietary_restrictions: row.try_get::<Vec<String>, _>("dietary_restrictions")?.into_iter().collect(),
            interests: row.try_get::<Vec<String>, _>("interests")?.into_iter().collect(),
            match_address: row.try_get("match_address")?,
            course_preference: row.try_get::<Option<Course>, _>("course_preference")?,
        },
        created_at: row.try_get("created_at")?,
    })
}
