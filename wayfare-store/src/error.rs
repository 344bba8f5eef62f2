use wayfare_core::CoreError;

/// Map a driver error onto the domain taxonomy. Constraint violations carry
/// meaning (double holds, negative stock); everything else is internal.
pub fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(mapped) = from_sqlstate(db.code().as_deref(), db.message()) {
            return mapped;
        }
    }
    tracing::error!("Database error: {}", err);
    CoreError::InternalError("database error".to_string())
}

fn from_sqlstate(code: Option<&str>, message: &str) -> Option<CoreError> {
    match code? {
        // unique_violation, exclusion_violation
        "23505" | "23P01" => Some(CoreError::Conflict(message.to_string())),
        // check_violation
        "23514" => Some(CoreError::ValidationError(message.to_string())),
        // lock_not_available, serialization_failure, deadlock_detected
        "55P03" | "40001" | "40P01" => Some(CoreError::Conflict(format!("concurrent update, retry: {}", message))),
        _ => None,
    }
}

/// Stored enum text that no longer parses.
pub(crate) fn corrupt(column: &str, value: &str) -> CoreError {
    tracing::error!("Unrecognised value {:?} in column {}", value, column);
    CoreError::InternalError(format!("unrecognised {} value", column))
}
