//! Connection configuration handed to [`Rd60xx::new`](crate::psu::Rd60xx::new).

use std::time::Duration;

use crate::scaling::OutputLimits;

/// Factory default baud rate of the RD60xx.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Factory default Modbus unit ID of the RD60xx.
pub const DEFAULT_DEVICE_ID: u8 = 0x01;

/// Default bound on waiting for a response. The PSU can take a while to respond.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Time the PSU needs to apply a written setting before it answers reliably again.
pub const DEFAULT_WRITE_SETTLE: Duration = Duration::from_millis(300);

fn default_port_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

/// Everything needed to open and talk to one PSU.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PortConfig {
    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows).
    pub port: String,
    pub baud_rate: u32,
    /// Modbus unit ID, 1-247.
    pub device_id: u8,
    /// Upper bound on waiting for a complete response frame.
    pub timeout: Duration,
    /// Pause after every successful register write.
    pub write_settle: Duration,
    pub limits: OutputLimits,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port: default_port_name(),
            baud_rate: DEFAULT_BAUD_RATE,
            device_id: DEFAULT_DEVICE_ID,
            timeout: DEFAULT_TIMEOUT,
            write_settle: DEFAULT_WRITE_SETTLE,
            limits: OutputLimits::default(),
        }
    }
}

impl PortConfig {
    /// Configuration for `port` at `baud_rate` talking to unit `device_id`, other
    /// settings at their defaults.
    pub fn new(port: impl Into<String>, baud_rate: u32, device_id: u8) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            device_id,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_write_settle(mut self, write_settle: Duration) -> Self {
        self.write_settle = write_settle;
        self
    }

    pub fn with_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Only 1-247 is a suitable ID for a single Modbus device.
    pub fn has_valid_device_id(&self) -> bool {
        (1..=247).contains(&self.device_id)
    }
}
