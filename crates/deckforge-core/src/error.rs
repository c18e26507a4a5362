//! Delivery error taxonomy shared by the sync traits.

use thiserror::Error;

/// Failure of a single delivery attempt against a deck store.
///
/// Duplicates are not represented here: a duplicate is an expected
/// outcome of the sync engine, not a failed attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network/API timeouts and server-side failures. Always retried
    /// through the delivery cascade.
    #[error("transient delivery error: {0}")]
    Transient(String),

    /// Malformed card payload or a payload the store rejected outright.
    /// Never retried.
    #[error("permanent validation error: {0}")]
    PermanentValidation(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}
