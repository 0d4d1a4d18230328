//! Opening the byte stream the PSU is attached to.
//!
//! The client only ever talks to an [`embedded_io::Read`] + [`embedded_io::Write`]
//! stream. A [`Connector`] knows how to produce that stream from a [`PortConfig`],
//! which lets the client own the whole connect/disconnect lifecycle.

use std::time::Duration;

use crate::config::PortConfig;

/// Error type of the stream a connector opens.
pub type PortError<C> = <<C as Connector>::Port as embedded_io::ErrorType>::Error;

/// The serial port controls the client needs on top of plain reads and writes.
pub trait SerialLink: embedded_io::Read + embedded_io::Write {
    /// Throw away everything received but not read yet.
    fn clear_input(&mut self) -> Result<(), Self::Error>;

    /// Limit how long the next read may block waiting for data.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error>;
}

/// Opens the serial link described by a [`PortConfig`].
pub trait Connector {
    type Port: SerialLink;

    /// Open and configure the link. Dropping the returned port closes it.
    fn open(
        &mut self,
        config: &PortConfig,
    ) -> Result<Self::Port, <Self::Port as embedded_io::ErrorType>::Error>;
}

#[cfg(feature = "serialport")]
pub use self::serial::{IoError, PortWrapper, SerialPortConnector};

#[cfg(feature = "serialport")]
mod serial {
    use std::{io, time::Duration};

    use serialport::SerialPort;

    use super::{Connector, SerialLink};
    use crate::config::PortConfig;

    /// Opens a local serial port with the `serialport` crate.
    ///
    /// The link is configured as 8 data bits, no parity, 1 stop bit, no flow control.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SerialPortConnector;

    impl Connector for SerialPortConnector {
        type Port = PortWrapper;

        fn open(&mut self, config: &PortConfig) -> Result<PortWrapper, IoError> {
            let port = serialport::new(config.port.as_str(), config.baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(config.timeout)
                .open()
                .map_err(|err| IoError(io::Error::from(err)))?;
            Ok(PortWrapper(port))
        }
    }

    /// A `serialport` port exposed through the `embedded-io` traits.
    pub struct PortWrapper(pub Box<dyn SerialPort>);

    impl core::fmt::Debug for PortWrapper {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.debug_tuple("PortWrapper")
                .field(&self.0.name().unwrap_or_default())
                .finish()
        }
    }

    /// [`std::io::Error`] carrying an `embedded-io` error kind.
    #[derive(Debug)]
    pub struct IoError(pub io::Error);

    impl core::fmt::Display for IoError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for IoError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl embedded_io::Error for IoError {
        fn kind(&self) -> embedded_io::ErrorKind {
            use embedded_io::ErrorKind as Kind;
            match self.0.kind() {
                // A serial read that gives up after the port timeout.
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Kind::TimedOut,
                io::ErrorKind::NotFound => Kind::NotFound,
                io::ErrorKind::PermissionDenied => Kind::PermissionDenied,
                io::ErrorKind::BrokenPipe => Kind::BrokenPipe,
                io::ErrorKind::NotConnected => Kind::NotConnected,
                io::ErrorKind::InvalidInput => Kind::InvalidInput,
                io::ErrorKind::InvalidData => Kind::InvalidData,
                io::ErrorKind::Interrupted => Kind::Interrupted,
                io::ErrorKind::Unsupported => Kind::Unsupported,
                _ => Kind::Other,
            }
        }
    }

    impl embedded_io::ErrorType for PortWrapper {
        type Error = IoError;
    }

    impl embedded_io::Read for PortWrapper {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            io::Read::read(&mut self.0, buf).map_err(IoError)
        }
    }

    impl embedded_io::Write for PortWrapper {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            io::Write::write(&mut self.0, buf).map_err(IoError)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            io::Write::flush(&mut self.0).map_err(IoError)
        }
    }

    impl SerialLink for PortWrapper {
        fn clear_input(&mut self) -> Result<(), IoError> {
            // Drain everything the PSU sent since the last request.
            loop {
                let pending = self
                    .0
                    .bytes_to_read()
                    .map_err(|err| IoError(io::Error::from(err)))?;
                if pending == 0 {
                    return Ok(());
                }
                let mut buf = [0u8; 64];
                let received = io::Read::read(&mut self.0, &mut buf).map_err(IoError)?;
                log::trace!("discard: {:02X?}", &buf[..received]);
            }
        }

        fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), IoError> {
            self.0
                .set_timeout(timeout)
                .map_err(|err| IoError(io::Error::from(err)))
        }
    }

}
