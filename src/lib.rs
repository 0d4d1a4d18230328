//! This crate provides an interface for communicating with and controlling the RuiDeng RD60xx series of programmable power supplies.
//!
//! It uses Modbus RTU under the hood, and is suitable for interfacing with the RD60xx PSUs over serial/UART or RS485.
//!
//! The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 115200
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! ## Features
//!
//! - `serialport` (default): [`transport::SerialPortConnector`] and [`psu::Rd60xx::serial`] for a local serial port.
//! - `serde`: `Serialize`/`Deserialize` for [`config::PortConfig`] and the register value types.
//!
//! ```no_run
//! # #[cfg(feature = "serialport")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ruideng_rd60xx::{config::PortConfig, psu::Rd60xx};
//!
//! let mut psu = Rd60xx::serial(PortConfig::new("/dev/ttyUSB0", 115_200, 1));
//! psu.connect()?;
//! psu.set_voltage(12.0)?;
//! psu.set_current(0.1)?;
//! psu.on()?;
//! println!("{:.3}V", psu.read_output_voltage()?);
//! psu.disconnect();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serialport"))]
//! # fn main() {}
//! ```
//!
//! The library only emits [`log`] records, installing a logger is up to the application.

pub mod config;
pub mod error;
mod frame;
pub mod psu;
pub mod register;
pub mod scaling;
pub mod transport;

pub use error::Error;

#[cfg(test)]
mod mock_serial;
