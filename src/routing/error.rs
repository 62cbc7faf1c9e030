use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingErrorKind {
    NotFound,
    Conflict,
    StorageError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RoutingError {
    pub kind: RoutingErrorKind,
    pub message: String,
}

impl RoutingError {
    pub fn new(kind: RoutingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RoutingErrorKind::NotFound
    }
}

pub fn not_found(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::NotFound, message)
}

pub fn conflict(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::Conflict, message)
}

pub fn storage_error(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::StorageError, message)
}
