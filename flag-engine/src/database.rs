use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

// Session defaults optimized for fast flag-evaluation reads. Mutations are
// single-row transactions, so the same budget covers them comfortably.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_millis(300),
    lock_timeout: Duration::from_millis(100),
    acquire_timeout: Duration::from_millis(200),
};

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        // Set PostgreSQL session-level timeouts for all queries on this connection
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let stmt_ms: i64 = timeouts
                    .statement_timeout
                    .as_millis()
                    .try_into()
                    .expect("statement_timeout too large");
                let lock_ms: i64 = timeouts
                    .lock_timeout
                    .as_millis()
                    .try_into()
                    .expect("lock_timeout too large");

                // SET commands don't accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{stmt_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(url)
        .await
}

/// Determines if a sqlx::Error is a unique constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            if let Some(code) = db_error.code() {
                code.as_ref() == "23505"
            } else {
                db_error
                    .message()
                    .to_lowercase()
                    .contains("unique constraint")
            }
        }
        _ => false,
    }
}
