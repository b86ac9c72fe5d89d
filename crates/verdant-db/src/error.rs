//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row was rejected for its content: a table constraint (SQLSTATE
    /// class 23) or a data exception such as a NUL byte or an out-of-range
    /// number (class 22). The enclosing transaction has already been rolled
    /// back when this is returned from `persist`.
    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: &'static str, message: String },
}

impl DbError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, DbError::Constraint { .. })
    }

    /// Lift a driver error into `Constraint` when the database rejected the
    /// row itself. Connection, pool and protocol errors stay `Postgres`.
    pub(crate) fn from_sqlx(table: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            let rejected = db.is_check_violation()
                || db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.code().is_some_and(|code| rejects_row(&code));
            if rejected {
                return DbError::Constraint { table, message: db.message().to_string() };
            }
        }
        DbError::Postgres(err)
    }
}

/// SQLSTATE classes caused by the row's values: 22 (data exception) and
/// 23 (integrity constraint violation).
fn rejects_row(sqlstate: &str) -> bool {
    sqlstate.starts_with("22") || sqlstate.starts_with("23")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_exceptions_reject_the_row() {
        assert!(rejects_row("22021"), "NUL byte in text");
        assert!(rejects_row("22003"), "numeric value out of range");
        assert!(rejects_row("22P02"), "invalid text representation");
        assert!(rejects_row("23514"), "check violation");
        assert!(rejects_row("23502"), "not-null violation");
    }

    #[test]
    fn test_infrastructure_states_stay_fatal() {
        assert!(!rejects_row("08006"), "connection failure");
        assert!(!rejects_row("53300"), "too many connections");
        assert!(!rejects_row("57P01"), "admin shutdown");
        assert!(!rejects_row("40001"), "serialization failure");
        assert!(!rejects_row("42P01"), "undefined table");
    }

    #[test]
    fn test_non_database_errors_are_not_constraints() {
        let err = DbError::from_sqlx("papers", sqlx::Error::PoolTimedOut);
        assert!(!err.is_constraint());
    }
}
