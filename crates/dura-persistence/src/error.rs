//! Errores de persistencia.
//! Mapea errores de Diesel / pool a variantes semánticas, y éstas a los
//! errores de los traits de almacenamiento (`StoreError`, `ChatError`).

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use dura_chat::ChatError;
use dura_core::StoreError;
use thiserror::Error;

use crate::pg::{is_retryable, is_transient_message};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Corrupt(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::TransientIo(m) => StoreError::Unavailable(m),
            PersistenceError::SerializationConflict => StoreError::Unavailable("serialization conflict".into()),
            PersistenceError::UniqueViolation(m)
            | PersistenceError::CheckViolation(m)
            | PersistenceError::ForeignKeyViolation(m) => StoreError::Conflict(m),
            PersistenceError::NotFound => StoreError::NotFound("row".into()),
            PersistenceError::Corrupt(m) => StoreError::Corrupt(m),
            PersistenceError::Unknown(m) if is_transient_message(&m) => StoreError::Unavailable(m),
            PersistenceError::Config(m) | PersistenceError::Unknown(m) => StoreError::Backend(m),
        }
    }
}

impl From<PersistenceError> for ChatError {
    fn from(err: PersistenceError) -> Self {
        match err {
            e if is_retryable(&e) => ChatError::Unavailable(e.to_string()),
            PersistenceError::ForeignKeyViolation(m) => ChatError::ConversationNotFound(m),
            other => ChatError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_stay_retryable_across_layers() {
        let store: StoreError = PersistenceError::TransientIo("pool timeout".into()).into();
        assert_eq!(store, StoreError::Unavailable("pool timeout".into()));
        let chat: ChatError = PersistenceError::SerializationConflict.into();
        assert!(chat.is_transient());
    }

    #[test]
    fn transient_unknown_errors_stay_retryable_across_layers() {
        let deadlock = || PersistenceError::Unknown("ERROR: deadlock detected".into());
        let chat: ChatError = deadlock().into();
        assert!(chat.is_transient(), "{chat:?}");
        let store: StoreError = deadlock().into();
        assert_eq!(store, StoreError::Unavailable("ERROR: deadlock detected".into()));

        let refused: ChatError = PersistenceError::Unknown("connection refused".into()).into();
        assert!(matches!(refused, ChatError::Unavailable(_)));

        let syntax: ChatError = PersistenceError::Unknown("syntax error at or near".into()).into();
        assert!(matches!(syntax, ChatError::Store(_)));
        let syntax: StoreError = PersistenceError::Unknown("syntax error at or near".into()).into();
        assert!(matches!(syntax, StoreError::Backend(_)));
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        assert!(matches!(PersistenceError::from(DieselError::NotFound), PersistenceError::NotFound));
    }
}
