use thiserror::Error;

use crate::database::models::EntityKind;
use crate::incidents::state::{IncidentAction, IncidentStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the monitoring core to its callers.
///
/// Probe failures are not represented here: they are recorded as failed
/// [`ProbeResult`](crate::monitoring::types::ProbeResult)s.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    #[error("cannot {action} incident {id}: it is already {from}")]
    InvalidTransition { id: i64, from: IncidentStatus, action: IncidentAction },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database query failed: {0}")]
    Persistence(#[from] libsql::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("failed to encode audit snapshot: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored value is unreadable: {0}")]
    Corrupt(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
