//! # Cash Session Repository
//!
//! Cash session lifecycle: open, close, reconcile.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Cash Session Lifecycle                              │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── open() → CashSession { status: Open, opening_float }           │
//! │         (unique partial indexes reject a second open per               │
//! │          cashier or per register)                                      │
//! │                                                                         │
//! │  2. COLLECT                                                            │
//! │     └── payments route through via the checkout scripts;               │
//! │         each paid sale binds to the session                            │
//! │                                                                         │
//! │  3. CLOSE                                                              │
//! │     └── close(counted) → expected = float + Σ non-void sale totals     │
//! │                          variance = counted − expected                 │
//! │         (terminal; the variance is recorded even when nonzero —        │
//! │          reconciliation is a reporting concern, not a gate)            │
//! │                                                                         │
//! │  3'. VOID                                                              │
//! │     └── void() → administrative escape hatch for sessions opened       │
//! │         by mistake; skips the count, terminal like CLOSE               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lumen_core::{validation, CashSession, CoreError, SessionStatus};

/// Repository for cash session operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Opens a cash session for a cashier at a register.
    ///
    /// The opening float must be non-negative. At most one OPEN session
    /// may exist per cashier and per register; the schema's partial
    /// unique indexes enforce this even under concurrent opens, and the
    /// violation surfaces as [`CoreError::SessionAlreadyOpen`].
    pub async fn open(
        &self,
        register_id: &str,
        cashier_id: &str,
        branch_id: &str,
        opening_float_cents: i64,
        notes: Option<&str>,
    ) -> DbResult<CashSession> {
        validation::validate_opening_float(opening_float_cents)?;

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            register_id: register_id.to_string(),
            cashier_id: cashier_id.to_string(),
            branch_id: branch_id.to_string(),
            opened_at: Utc::now(),
            opening_float_cents,
            closed_at: None,
            closing_count_cents: None,
            expected_cents: None,
            variance_cents: None,
            status: SessionStatus::Open,
            notes: notes.map(str::to_string),
        };

        debug!(id = %session.id, register_id, cashier_id, "Opening cash session");

        let result = sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, register_id, cashier_id, branch_id, opened_at,
                opening_float_cents, status, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&session.id)
        .bind(&session.register_id)
        .bind(&session.cashier_id)
        .bind(&session.branch_id)
        .bind(session.opened_at)
        .bind(session.opening_float_cents)
        .bind(session.status)
        .bind(&session.notes)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(id = %session.id, "Cash session opened");
                Ok(session)
            }
            Err(err) => match DbError::from(err) {
                // Partial index violations report the index name
                // (ux_open_session_per_register / _per_cashier)
                DbError::UniqueViolation { field, .. } => {
                    let owner = if field.contains("register") {
                        format!("register {register_id}")
                    } else {
                        format!("cashier {cashier_id}")
                    };
                    Err(DbError::Domain(CoreError::SessionAlreadyOpen { owner }))
                }
                other => Err(other),
            },
        }
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Finds the OPEN session of a cashier, if any.
    pub async fn find_open_for_cashier(&self, cashier_id: &str) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE cashier_id = ?1 AND status = 'open'",
        )
        .bind(cashier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Finds the OPEN session at a register, if any.
    pub async fn find_open_for_register(&self, register_id: &str) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE register_id = ?1 AND status = 'open'",
        )
        .bind(register_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Closes a session with the cashier's counted total.
    ///
    /// Computes in one transaction:
    /// - expected = opening float + Σ totals of non-void sales bound
    ///   to the session
    /// - variance = counted − expected
    ///
    /// A nonzero variance does not block closing; it is recorded for
    /// the reconciliation report. Only the owning cashier may close.
    pub async fn close(
        &self,
        session_id: &str,
        cashier_id: &str,
        closing_count_cents: i64,
        notes: Option<&str>,
    ) -> DbResult<CashSession> {
        if closing_count_cents < 0 {
            return Err(DbError::Domain(CoreError::InvalidPaymentAmount {
                reason: "closing count must be non-negative".to_string(),
            }));
        }

        let mut tx = self.pool.begin().await?;

        let session = Self::fetch(&mut tx, session_id).await?;

        if session.status != SessionStatus::Open {
            return Err(DbError::Domain(CoreError::SessionNotOpen {
                session_id: session_id.to_string(),
            }));
        }
        if session.cashier_id != cashier_id {
            return Err(DbError::Domain(CoreError::SessionOwnedByOther {
                session_id: session_id.to_string(),
                owner_id: session.cashier_id,
            }));
        }

        let collected = Self::collected_total(&mut tx, session_id).await?;
        let expected = session.opening_float_cents + collected;
        let variance = closing_count_cents - expected;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE cash_sessions SET
                status = 'closed',
                closed_at = ?2,
                closing_count_cents = ?3,
                expected_cents = ?4,
                variance_cents = ?5,
                notes = COALESCE(?6, notes)
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(closing_count_cents)
        .bind(expected)
        .bind(variance)
        .bind(notes)
        .execute(&mut *tx)
        .await?;

        let closed = Self::fetch(&mut tx, session_id).await?;
        tx.commit().await?;

        info!(
            id = %session_id,
            expected_cents = expected,
            variance_cents = variance,
            "Cash session closed"
        );

        Ok(closed)
    }

    /// Administratively voids an OPEN session.
    ///
    /// For sessions opened by mistake; a session that has collected
    /// payments should be closed and reconciled instead. Terminal.
    pub async fn void(&self, session_id: &str) -> DbResult<CashSession> {
        let result = sqlx::query(
            "UPDATE cash_sessions SET status = 'void', closed_at = ?2 WHERE id = ?1 AND status = 'open'",
        )
        .bind(session_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Missing and non-open look the same to the guard; tell them apart
            return match self.get_by_id(session_id).await? {
                None => Err(DbError::not_found("Cash session", session_id)),
                Some(_) => Err(DbError::Domain(CoreError::SessionNotOpen {
                    session_id: session_id.to_string(),
                })),
            };
        }

        info!(id = %session_id, "Cash session voided");

        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, session_id).await
    }

    /// Fetches a session inside the caller's transaction.
    pub async fn fetch(conn: &mut SqliteConnection, session_id: &str) -> DbResult<CashSession> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?;

        session.ok_or_else(|| DbError::not_found("Cash session", session_id))
    }

    /// Sum of non-void sale totals bound to a session.
    async fn collected_total(conn: &mut SqliteConnection, session_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_cents)
            FROM sales
            WHERE session_id = ?1 AND status != 'void'
            "#,
        )
        .bind(session_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total.unwrap_or(0))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_open_and_close_with_no_sales() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions
            .open("reg-1", "cash-1", "b1", 10_000, None)
            .await
            .unwrap();
        assert!(session.is_open());

        let closed = sessions.close(&session.id, "cash-1", 10_000, None).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.expected_cents, Some(10_000));
        assert_eq!(closed.variance_cents, Some(0));
    }

    #[tokio::test]
    async fn test_second_open_for_same_cashier_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        let err = sessions
            .open("reg-2", "cash-1", "b1", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionAlreadyOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_open_for_same_register_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        let err = sessions
            .open("reg-1", "cash-2", "b1", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionAlreadyOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_after_close_allowed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let first = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        sessions.close(&first.id, "cash-1", 0, None).await.unwrap();

        // A closed session no longer blocks the cashier or register
        let second = sessions.open("reg-1", "cash-1", "b1", 5_000, None).await.unwrap();
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn test_only_owner_may_close() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        let err = sessions
            .close(&session.id, "cash-2", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionOwnedByOther { .. })
        ));
    }

    #[tokio::test]
    async fn test_closing_twice_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        sessions.close(&session.id, "cash-1", 0, None).await.unwrap();

        let err = sessions
            .close(&session.id, "cash-1", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionNotOpen { .. })
        ));
    }

    /// Race the one-open-session-per-cashier index: eight parallel
    /// opens on a shared file-backed pool, exactly one may win.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opens_admit_one_session() {
        let path = std::env::temp_dir().join(format!("lumen-sessions-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(5))
            .await
            .unwrap();
        let sessions = db.sessions();

        let mut handles = Vec::new();
        for i in 0..8 {
            let sessions = sessions.clone();
            handles.push(tokio::spawn(async move {
                let register = format!("reg-{i}");
                // Lock waits are retried; only the domain verdict counts
                loop {
                    match sessions.open(&register, "cash-race", "b1", 0, None).await {
                        Err(err) if err.is_transient() => continue,
                        outcome => return outcome,
                    }
                }
            }));
        }

        let mut opened = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => opened += 1,
                Err(err) => assert!(matches!(
                    err.as_domain(),
                    Some(CoreError::SessionAlreadyOpen { .. })
                )),
            }
        }
        assert_eq!(opened, 1);

        let open = sessions.find_open_for_cashier("cash-race").await.unwrap();
        assert!(open.is_some());

        db.close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    #[tokio::test]
    async fn test_void_open_session_frees_register() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        let voided = sessions.void(&session.id).await.unwrap();
        assert_eq!(voided.status, SessionStatus::Void);
        assert!(voided.closed_at.is_some());
        assert_eq!(voided.closing_count_cents, None);

        // The register and cashier are free again
        let reopened = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        assert!(reopened.is_open());
    }

    #[tokio::test]
    async fn test_void_closed_session_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.open("reg-1", "cash-1", "b1", 0, None).await.unwrap();
        sessions.close(&session.id, "cash-1", 0, None).await.unwrap();

        let err = sessions.void(&session.id).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionNotOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_negative_opening_float_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err = db
            .sessions()
            .open("reg-1", "cash-1", "b1", -1, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::Validation(_))
        ));
    }
}
