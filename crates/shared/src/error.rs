use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StoreRead,
    StoreWrite,
    BridgeUnavailable,
    UserAbandonedFlow,
    Validation,
}

/// Failure taxonomy for the consent subsystem.
///
/// None of these reach the visitor as a visible error. Every variant degrades
/// to "no consent" for whatever it touched.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("stored consent value is unreadable: {0}")]
    StoreRead(String),
    #[error("failed to persist consent record: {0}")]
    StoreWrite(String),
    #[error("tag runtime is not available")]
    BridgeUnavailable,
    #[error("consent flow dismissed without a decision")]
    UserAbandonedFlow,
    #[error("consent record denies necessary storage")]
    NecessaryDenied,
    #[error("unknown consent category '{0}'")]
    UnknownCategory(String),
    #[error("invalid provider catalog: {0}")]
    InvalidCatalog(String),
    #[error("invalid tag manager container id '{0}'")]
    InvalidContainerId(String),
}

impl ConsentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsentError::StoreRead(_) | ConsentError::NecessaryDenied => ErrorKind::StoreRead,
            ConsentError::StoreWrite(_) => ErrorKind::StoreWrite,
            ConsentError::BridgeUnavailable => ErrorKind::BridgeUnavailable,
            ConsentError::UserAbandonedFlow => ErrorKind::UserAbandonedFlow,
            ConsentError::UnknownCategory(_)
            | ConsentError::InvalidCatalog(_)
            | ConsentError::InvalidContainerId(_) => ErrorKind::Validation,
        }
    }
}

