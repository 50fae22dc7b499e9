use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single failed precondition for saving or printing a box.
///
/// Every precondition is evaluated independently so the operator sees all of
/// them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BoxRejection {
    /// The box has no items.
    Empty,
    /// At least one item's order line has not been checked.
    UncheckedItems,
    /// At least one item has no batch number (own or box default).
    MissingBatchNumbers,
    /// At least one weighed item has no recorded weight.
    MissingWeights,
    /// The label cannot be printed before the box is saved.
    NotSaved,
    /// The label for this box was already printed.
    AlreadyPrinted,
    /// A lower-numbered box still waits for its label.
    Locked { waiting_on: i32 },
}

impl std::fmt::Display for BoxRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoxRejection::Empty => write!(f, "box is empty"),
            BoxRejection::UncheckedItems => write!(f, "unchecked items"),
            BoxRejection::MissingBatchNumbers => write!(f, "missing batch numbers"),
            BoxRejection::MissingWeights => write!(f, "missing weights"),
            BoxRejection::NotSaved => write!(f, "box not yet saved"),
            BoxRejection::AlreadyPrinted => write!(f, "label already printed"),
            BoxRejection::Locked { waiting_on } => {
                write!(f, "box {} label must be printed first", waiting_on)
            }
        }
    }
}

fn join_reasons(reasons: &[BoxRejection]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Box {box_number} is not ready: {}", join_reasons(.reasons))]
    BoxNotReady {
        box_number: i32,
        reasons: Vec<BoxRejection>,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Rejections that leave the working set untouched and can be fixed by the
    /// operator in the same session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::BoxNotReady { .. }
        )
    }

    /// Errors after which the session should return to a list view instead of
    /// retrying (stale ids).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Reasons carried by a box precondition failure, empty for other errors.
    pub fn box_rejections(&self) -> &[BoxRejection] {
        match self {
            Self::BoxNotReady { reasons, .. } => reasons,
            _ => &[],
        }
    }

    /// Message suitable for showing to an operator.
    /// Storage failures get a generic message to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal error".to_string()
            }
            Self::ConcurrentModification(id) => {
                format!("Order {} was saved by another session; reload before saving", id)
            }
            _ => self.to_string(),
        }
    }
}
