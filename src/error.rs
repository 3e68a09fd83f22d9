use std::time::Duration;

use thiserror::Error;

use crate::{config::ConfigError, driver::DriverError};

/// Everything that can stop a booking run.
///
/// Only [`BookingError::SessionExpired`], [`BookingError::NoSlotElements`] and
/// [`BookingError::NoMatch`] are ever recovered from, and each at most once.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("persisted session has expired")]
    SessionExpired,
    #[error("no time slot elements appeared on the page")]
    NoSlotElements,
    #[error("no time slot matches {0}")]
    NoMatch(String),
    #[error("no courts available (tried 1-{0})")]
    CourtsExhausted(u32),
    #[error("booking confirmation did not appear within {0:?}")]
    DialogTimeout(Duration),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl BookingError {
    /// Recoverable errors get exactly one local fallback before escalating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BookingError::SessionExpired | BookingError::NoSlotElements | BookingError::NoMatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
