use sea_orm::{DbErr, SqlErr};

/// True when `err` is a unique-constraint violation.
///
/// Callers that rely on a unique index to arbitrate concurrent inserts treat
/// this as "someone else got there first" rather than as a failure.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
