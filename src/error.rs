//! Our error types for the serial link, the power monitors and the scheduler.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Errors raised while exchanging lines with the host over the serial link.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Serial write did not complete")]
    Timeout,
    #[error("Line does not fit the buffer")]
    BufferError,
}

/// Errors raised by a power monitor while taking a reading.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("I2C bus error: {0:?}")]
    Bus(embedded_hal::i2c::ErrorKind),
    #[error("Invalid reading received")]
    InvalidReading,
}

impl SensorError {
    /// Wrap any HAL I2C error, keeping only its kind.
    pub fn from_i2c<E: embedded_hal::i2c::Error>(err: E) -> Self {
        SensorError::Bus(err.kind())
    }
}

/// Errors raised when registering or changing scheduled tasks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Task table is full")]
    Full,
    #[error("Task is already scheduled")]
    Duplicate,
    #[error("Task is not scheduled")]
    Unknown,
    #[error("Task period must be non-zero")]
    ZeroPeriod,
    #[error("Task period is too long for the clock")]
    PeriodTooLong,
}
