//! Our error types for the RD60xx PSUs.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for RD60xx PSU communications.
///
/// `I` is the I/O error type of the underlying byte stream.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Cannot open serial link: {0:?}")]
    ConnectionError(I),
    #[error("Not connected")]
    NotConnected,
    #[error("Serial communication error: {0:?}")]
    SerialError(I),
    #[error("Modbus protocol error: {0}")]
    ModbusError(rmodbus::ErrorKind),
    #[error("Communication timeout")]
    Timeout,
    #[error("Invalid range")]
    InvalidRange,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Frame does not fit the buffer")]
    BufferError,
}

impl<I: embedded_io::Error> Error<I> {
    /// True for errors caused by a malformed, corrupted or rejected response frame.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::ModbusError(_) | Error::InvalidResponse)
    }

    /// True when the error left the link closed.
    pub(crate) fn closes_link(&self) -> bool {
        matches!(self, Error::SerialError(_))
    }
}

impl<I: embedded_io::Error> From<rmodbus::ErrorKind> for Error<I> {
    fn from(err: rmodbus::ErrorKind) -> Self {
        Error::ModbusError(err)
    }
}
