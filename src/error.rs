use crate::domain::booking::{BookingEvent, BookingStatus};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum RentalError {
    #[error("Invalid rental window: return must be after pickup")]
    #[diagnostic(code(rentcore::invalid_window))]
    InvalidWindow,

    #[error("Illegal transition: cannot {event} a booking that is {from}")]
    #[diagnostic(code(rentcore::illegal_transition))]
    IllegalTransition {
        from: BookingStatus,
        event: BookingEvent,
    },

    #[error("Payment gateway error: {0}")]
    #[diagnostic(code(rentcore::gateway), help("retry with the same order reference"))]
    Gateway(String),

    #[error("{entity} not found: {id}")]
    #[diagnostic(code(rentcore::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    #[diagnostic(code(rentcore::conflict))]
    Conflict(String),

    #[error("Forbidden: {0}")]
    #[diagnostic(code(rentcore::forbidden))]
    Forbidden(String),

    #[error("Validation error: {0}")]
    #[diagnostic(code(rentcore::validation))]
    Validation(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl RentalError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for RentalError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl From<serde_json::Error> for RentalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RentalError>;
