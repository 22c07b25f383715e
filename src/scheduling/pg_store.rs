use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, AppointmentDraft, AppointmentRow, AppointmentStatus, TokenNumber};
use crate::scheduling::store::AppointmentRepository;

/// Partial unique index over pending/approved rows (see migrations).
const ACTIVE_SLOT_INDEX: &str = "appointment_active_slot_uq";

/*
Postgres error codes treated as lock contention:
40001 serialization_failure
40P01 deadlock_detected
55P03 lock_not_available (lock_timeout)
*/
fn is_contention(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001" | "40P01" | "55P03")),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn is_slot_conflict(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation() && db.constraint() == Some(ACTIVE_SLOT_INDEX),
        _ => false,
    }
}

pub struct PgAppointments {
    db: PgPool,
    max_attempts: u32,
}

impl PgAppointments {
    pub fn new(db: PgPool, max_attempts: u32) -> Self {
        Self {
            db,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs `op`, retrying lock-contention failures with jittered backoff.
    async fn retrying<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, SchedulingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_contention(&e) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(op = what, attempt, error = %e, "giving up after lock contention");
                        return Err(SchedulingError::Contention);
                    }
                    let jitter = rand::thread_rng().gen_range(0..25u64);
                    let wait = Duration::from_millis(20 * u64::from(attempt) + jitter);
                    tracing::debug!(op = what, attempt, ?wait, "lock contention, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `Ok(None)` when the slot is already held.
    async fn try_reserve(&self, draft: &AppointmentDraft) -> Result<Option<Appointment>, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await?;

        // Cheap early exit; the partial unique index is what actually decides.
        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1
              FROM appointment
              WHERE service_id = $1
                AND appointment_date = $2
                AND appointment_time = $3
                AND status IN (0, 1)
            )
            "#,
        )
        .bind(draft.service_id)
        .bind(draft.date)
        .bind(draft.time)
        .fetch_one(&mut *tx)
        .await?;
        if held {
            return Ok(None);
        }

        // Row lock on the counter serializes token issue per day + department
        // until commit; a rollback gives the number back.
        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO token_counter (counter_date, department, last_seq)
            VALUES ($1, $2, 1)
            ON CONFLICT (counter_date, department)
            DO UPDATE SET last_seq = token_counter.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(draft.date)
        .bind(&draft.department)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, AppointmentRow>(
            r#"
            INSERT INTO appointment (
              appointment_id,
              student_id,
              service_id,
              department,
              appointment_date,
              appointment_time,
              status,
              token_code,
              token_seq,
              notes,
              created_at,
              updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6, 0, $7, $8, $9, $10, $10)
            RETURNING
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            "#,
        )
        .bind(draft.appointment_id)
        .bind(draft.student_id)
        .bind(draft.service_id)
        .bind(&draft.department)
        .bind(draft.date)
        .bind(draft.time)
        .bind(TokenNumber::department_code(&draft.department))
        .bind(seq)
        .bind(draft.notes.as_deref())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_slot_conflict(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(Some(row.into()))
    }
}

#[async_trait]
impl AppointmentRepository for PgAppointments {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn reserve(&self, draft: AppointmentDraft) -> Result<Appointment, SchedulingError> {
        self.retrying("reserve", || self.try_reserve(&draft))
            .await?
            .ok_or(SchedulingError::SlotUnavailable {
                date: draft.date,
                time: draft.time,
            })
    }

    async fn fetch(&self, appointment_id: Uuid) -> Result<Option<Appointment>, SchedulingError> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            FROM appointment
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Appointment::from))
    }

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let row = self
            .retrying("set_status", || {
                sqlx::query_as::<_, AppointmentRow>(
                    r#"
                    UPDATE appointment
                    SET status = $3,
                        admin_notes = COALESCE($4, admin_notes),
                        updated_at = now()
                    WHERE appointment_id = $1
                      AND status = $2
                    RETURNING
                      appointment_id, student_id, service_id, department,
                      appointment_date, appointment_time, status,
                      token_code, token_seq, notes, admin_notes, created_at, updated_at
                    "#,
                )
                .bind(appointment_id)
                .bind(expected)
                .bind(next)
                .bind(admin_notes.as_deref())
                .fetch_optional(&self.db)
            })
            .await?;
        Ok(row.map(Appointment::from))
    }

    async fn active_for_service(
        &self,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            FROM appointment
            WHERE service_id = $1
              AND appointment_date = $2
              AND status IN (0, 1)
            ORDER BY appointment_time ASC
            "#,
        )
        .bind(service_id)
        .bind(date)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn active_for_department(
        &self,
        date: NaiveDate,
        department: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            FROM appointment
            WHERE appointment_date = $1
              AND department = $2
              AND status IN (0, 1)
            ORDER BY token_seq ASC
            "#,
        )
        .bind(date)
        .bind(department)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn active_for_student(
        &self,
        date: NaiveDate,
        student_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            FROM appointment
            WHERE appointment_date = $1
              AND student_id = $2
              AND status IN (0, 1)
            ORDER BY appointment_time ASC
            "#,
        )
        .bind(date)
        .bind(student_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT
              appointment_id, student_id, service_id, department,
              appointment_date, appointment_time, status,
              token_code, token_seq, notes, admin_notes, created_at, updated_at
            FROM appointment
            WHERE student_id = $1
            ORDER BY appointment_date DESC, appointment_time DESC, created_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn lazy_repo(max_attempts: u32) -> PgAppointments {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://campus@localhost/campus")
            .unwrap();
        PgAppointments::new(pool, max_attempts)
    }

    #[test]
    fn non_database_errors_are_not_contention() {
        assert!(!is_contention(&sqlx::Error::RowNotFound));
        assert!(is_contention(&sqlx::Error::PoolTimedOut));
        assert!(!is_slot_conflict(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn lazy_pool_reports_backend_tag() {
        let repo = lazy_repo(0);
        assert_eq!(repo.backend_tag(), "postgres");
        assert_eq!(repo.max_attempts, 1);
    }

    #[tokio::test]
    async fn retrying_recovers_after_transient_contention() {
        let repo = lazy_repo(3);
        let calls = AtomicU32::new(0);
        let out = repo
            .retrying("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(sqlx::Error::PoolTimedOut)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_gives_up_with_contention() {
        let repo = lazy_repo(3);
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = repo
            .retrying("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(sqlx::Error::PoolTimedOut) }
            })
            .await;
        assert!(matches!(out, Err(SchedulingError::Contention)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_does_not_retry_other_failures() {
        let repo = lazy_repo(3);
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = repo
            .retrying("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(sqlx::Error::RowNotFound) }
            })
            .await;
        assert!(matches!(out, Err(SchedulingError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Needs a live database; skipped when DATABASE_URL is unset.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reserves_on_postgres_leave_one_winner_and_one_token() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping postgres reserve test");
            return;
        };
        let pool = crate::db::connect_pg(&url, 16).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        // Fresh department so the day's counter starts from zero.
        let department = format!("T{}", Uuid::new_v4().simple());
        // Inserted directly: earlier runs may already hold this token code.
        let service_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO service (service_id, name, department, duration_minutes) VALUES ($1, $2, $3, 15)",
        )
        .bind(service_id)
        .bind("Transcript Request")
        .bind(&department)
        .execute(&pool)
        .await
        .unwrap();

        let repo = Arc::new(PgAppointments::new(pool.clone(), 5));
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let time = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        let n = 8;
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let repo = repo.clone();
            let draft = AppointmentDraft {
                appointment_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                service_id,
                department: department.clone(),
                date,
                time,
                notes: None,
                created_at: Utc::now(),
            };
            handles.push(tokio::spawn(async move { repo.reserve(draft).await }));
        }

        let mut wins = 0;
        let mut unavailable = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(a) => {
                    wins += 1;
                    assert_eq!(a.token_number.seq, 1);
                }
                Err(SchedulingError::SlotUnavailable { .. }) => unavailable += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(unavailable, n - 1);

        let last_seq: i32 = sqlx::query_scalar(
            "SELECT last_seq FROM token_counter WHERE counter_date = $1 AND department = $2",
        )
        .bind(date)
        .bind(&department)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(last_seq, 1);
    }
}
