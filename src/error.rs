use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderChainError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The timer gateway refused to arm a wake-up.
    #[error("scheduling denied: {0}")]
    SchedulingDenied(String),
    #[error("notification denied: {0}")]
    NotificationDenied(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The import payload could not be parsed at all.
    #[error("import format error: {0}")]
    ImportFormat(String),
    #[error("reminder {0} not found")]
    NotFound(i32),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<diesel::result::Error> for ReminderChainError {
    fn from(err: diesel::result::Error) -> Self {
        ReminderChainError::StorageUnavailable(err.to_string())
    }
}

pub use crate::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_errors_surface_as_storage_failures() {
        let err: ReminderChainError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, ReminderChainError::StorageUnavailable(_)));
        assert!(format!("{err}").contains("storage unavailable"));
    }

    #[test]
    fn display_names_the_error_kind() {
        let err = ReminderChainError::SchedulingDenied("exact alarms revoked".to_string());
        assert_eq!(format!("{err}"), "scheduling denied: exact alarms revoked");
        let err = ReminderChainError::NotFound(7);
        assert_eq!(format!("{err}"), "reminder 7 not found");
    }
}
