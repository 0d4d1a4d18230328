use std::time::Instant;

use embedded_io::{Error as _, ErrorKind, Read, Write};

use crate::{
    config::PortConfig,
    error::{Error, Result},
    frame::{self, READ_HOLDINGS, WRITE_RESPONSE_LEN, WRITE_SINGLE},
    register::{
        ControlMode, PresetGroup, ProtectionStatus, Rd60xxRegister, State, Temperature,
        TemperatureUnit,
    },
    scaling,
    transport::{Connector, PortError, SerialLink},
};

/// Client for one RD60xx PSU on one serial link.
///
/// The link is opened with [`Self::connect`] through the given [`Connector`] and stays
/// owned by the client until [`Self::disconnect`]. Every accessor is a live round trip
/// to the PSU, nothing is cached.
///
/// Naming: "set" writes a configuration value and "read_*_setting" reads it back,
/// other "read" methods return a measured value or a status.
///
/// The client does no locking. Wrap it in a mutex to share it between threads.
pub struct Rd60xx<C: Connector, const L: usize = 128> {
    connector: C,
    config: PortConfig,
    /// `None` while the link is closed.
    interface: Option<C::Port>,
}

#[cfg(feature = "serialport")]
impl Rd60xx<crate::transport::SerialPortConnector> {
    /// Create a client for a PSU attached to a local serial port.
    pub fn serial(config: PortConfig) -> Self {
        Self::new(crate::transport::SerialPortConnector, config)
    }
}

impl<C: Connector, const L: usize> Rd60xx<C, L> {
    /// Create a new client. The link starts closed.
    pub fn new(connector: C, config: PortConfig) -> Self {
        Self {
            connector,
            config,
            interface: None,
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_some()
    }

    /// Open the serial link. An already open link is closed and opened again.
    pub fn connect(&mut self) -> Result<(), PortError<C>> {
        if !self.config.has_valid_device_id() {
            log::error!("Invalid device id {}", self.config.device_id);
            return Err(Error::InvalidRange);
        }
        self.disconnect();

        let port = self.connector.open(&self.config).map_err(|err| {
            log::error!("Cannot open {}: {:?}", self.config.port, err);
            Error::ConnectionError(err)
        })?;
        self.interface = Some(port);
        log::debug!(
            "Connected to {} at {} baud, device id {}",
            self.config.port,
            self.config.baud_rate,
            self.config.device_id
        );
        Ok(())
    }

    /// Close the serial link. Closing a closed link does nothing.
    pub fn disconnect(&mut self) {
        if self.interface.take().is_some() {
            log::debug!("Disconnected from {}", self.config.port);
        }
    }

    /// Return the raw "PRODUCT_MODEL" register value.
    pub fn read_product_model(&mut self) -> Result<u16, PortError<C>> {
        self.read_modbus_single(Rd60xxRegister::ProductModel)
    }

    /// Return the serial number, high word as hex followed by the low word as decimal.
    pub fn read_serial_number(&mut self) -> Result<String, PortError<C>> {
        let words = self.read_modbus_bulk(Rd60xxRegister::SnHigh, 2)?;
        Ok(format!("{:04X}{:04}", words[0], words[1]))
    }

    /// Return the firmware version. Register value `123` -> `1.23`.
    pub fn read_firmware_version(&mut self) -> Result<f32, PortError<C>> {
        let value = self.read_modbus_single(Rd60xxRegister::FwVersion)?;
        Ok(f32::from(value) / 100.0)
    }

    /// Return the system temperature in degrees Celsius.
    pub fn read_temperature_celsius(&mut self) -> Result<Temperature, PortError<C>> {
        let words = self.read_modbus_bulk(Rd60xxRegister::CelsiusSign, 2)?;
        Ok(Temperature::from_sign_and_value(
            words[0],
            words[1],
            TemperatureUnit::Celsius,
        ))
    }

    /// Return the system temperature in degrees Fahrenheit.
    pub fn read_temperature_fahrenheit(&mut self) -> Result<Temperature, PortError<C>> {
        let words = self.read_modbus_bulk(Rd60xxRegister::FahrenheitSign, 2)?;
        Ok(Temperature::from_sign_and_value(
            words[0],
            words[1],
            TemperatureUnit::Fahrenheit,
        ))
    }

    /// Set the output target voltage in volts.
    ///
    /// The value is rounded to the PSU resolution of 1mV. Values outside of
    /// `0..=limits.max_voltage_mv` are rejected, not clamped.
    pub fn set_voltage(&mut self, volts: f32) -> Result<(), PortError<C>> {
        let millivolts = self.config.limits.voltage_to_raw(volts).ok_or_else(|| {
            log::error!("Voltage {:06.3}V out of range", volts);
            Error::InvalidRange
        })?;
        self.write_modbus_single(Rd60xxRegister::VSet, millivolts)
    }

    /// Get the output target voltage in volts.
    pub fn read_voltage_setting(&mut self) -> Result<f32, PortError<C>> {
        let millivolts = self.read_modbus_single(Rd60xxRegister::VSet)?;
        Ok(scaling::from_milli(millivolts.into()))
    }

    /// Set the output current limit in amps.
    ///
    /// The value is rounded to the PSU resolution of 1mA. Values outside of
    /// `0..=limits.max_current_ma` are rejected, not clamped.
    pub fn set_current(&mut self, amps: f32) -> Result<(), PortError<C>> {
        let milliamps = self.config.limits.current_to_raw(amps).ok_or_else(|| {
            log::error!("Current {:06.3}A out of range", amps);
            Error::InvalidRange
        })?;
        self.write_modbus_single(Rd60xxRegister::ISet, milliamps)
    }

    /// Get the output current limit in amps.
    pub fn read_current_setting(&mut self) -> Result<f32, PortError<C>> {
        let milliamps = self.read_modbus_single(Rd60xxRegister::ISet)?;
        Ok(scaling::from_milli(milliamps.into()))
    }

    /// Return the measured output voltage in volts.
    pub fn read_output_voltage(&mut self) -> Result<f32, PortError<C>> {
        let millivolts = self.read_modbus_single(Rd60xxRegister::VOut)?;
        Ok(scaling::from_milli(millivolts.into()))
    }

    /// Return the measured output current in amps.
    pub fn read_output_current(&mut self) -> Result<f32, PortError<C>> {
        let milliamps = self.read_modbus_single(Rd60xxRegister::IOut)?;
        Ok(scaling::from_milli(milliamps.into()))
    }

    /// Return the output power in watts.
    pub fn read_output_power(&mut self) -> Result<f32, PortError<C>> {
        let words = self.read_modbus_bulk(Rd60xxRegister::PowerHigh, 2)?;
        Ok(scaling::from_milli(scaling::join_words(words[0], words[1])))
    }

    /// Return the measured supply input voltage in volts.
    pub fn read_input_voltage(&mut self) -> Result<f32, PortError<C>> {
        let centivolts = self.read_modbus_single(Rd60xxRegister::UIn)?;
        Ok(scaling::from_centi(centivolts))
    }

    /// Get the current state of the key lock.
    pub fn read_keyboard_lock(&mut self) -> Result<State, PortError<C>> {
        let value = self.read_modbus_single(Rd60xxRegister::Lock)?;
        Ok(State::from(value != 0))
    }

    pub fn lock_keyboard(&mut self) -> Result<(), PortError<C>> {
        self.write_modbus_single(Rd60xxRegister::Lock, State::On as u16)
    }

    pub fn unlock_keyboard(&mut self) -> Result<(), PortError<C>> {
        self.write_modbus_single(Rd60xxRegister::Lock, State::Off as u16)
    }

    /// Return which protection has tripped, if any.
    pub fn read_protection_status(&mut self) -> Result<ProtectionStatus, PortError<C>> {
        let value = self.read_modbus_single(Rd60xxRegister::Protect)?;
        ProtectionStatus::try_from(value).map_err(|code| {
            log::warn!("Unknown protection status {}", code);
            Error::InvalidResponse
        })
    }

    /// Get the currently active control mode. (CV or CC.)
    pub fn read_control_mode(&mut self) -> Result<ControlMode, PortError<C>> {
        let value = self.read_modbus_single(Rd60xxRegister::CvCc)?;
        Ok(ControlMode::from(value))
    }

    /// Enable the output.
    pub fn on(&mut self) -> Result<(), PortError<C>> {
        self.set_output_state(State::On)
    }

    /// Disable the output.
    pub fn off(&mut self) -> Result<(), PortError<C>> {
        self.set_output_state(State::Off)
    }

    /// Enable/disable the output.
    pub fn set_output_state(&mut self, state: impl Into<State>) -> Result<(), PortError<C>> {
        let state: State = state.into();
        self.write_modbus_single(Rd60xxRegister::OnOff, state as u16)
    }

    /// Read whether the output is enabled or disabled.
    pub fn read_output_state(&mut self) -> Result<State, PortError<C>> {
        let value = self.read_modbus_single(Rd60xxRegister::OnOff)?;
        Ok(State::from(value != 0))
    }

    /// Recall one of the stored data groups (0 - 9).
    pub fn shortcut_callout(&mut self, group: u8) -> Result<(), PortError<C>> {
        let group = PresetGroup::try_from(group).map_err(|number| {
            log::error!("Data group {} out of range 0-9", number);
            Error::InvalidRange
        })?;
        self.write_modbus_single(Rd60xxRegister::ShortcutCallout, group)?;
        log::info!("Recalled data group {}", group as u16);
        Ok(())
    }

    /// Write to a single register of the PSU.
    ///
    /// The PSU echoes the request back on success. Returns after the configured settle
    /// delay so the next request is not sent while the setting is still being applied.
    pub fn write_modbus_single(
        &mut self,
        register: impl Into<u16>,
        data: impl Into<u16>,
    ) -> Result<(), PortError<C>> {
        let mut request: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req =
            rmodbus::client::ModbusRequest::new(self.config.device_id, rmodbus::ModbusProto::Rtu);
        req.generate_set_holding(register.into(), data.into(), &mut request)?;

        let response = self.transact(&request, WRITE_RESPONSE_LEN)?;
        frame::validate::<PortError<C>>(&response, self.config.device_id, WRITE_SINGLE)?;
        req.parse_ok(&response)?;
        if request.as_slice() != response.as_slice() {
            log::warn!(
                "Write not echoed - sent={:02X?} received={:02X?}",
                request.as_slice(),
                response.as_slice()
            );
            return Err(Error::InvalidResponse);
        }

        if !self.config.write_settle.is_zero() {
            std::thread::sleep(self.config.write_settle);
        }
        Ok(())
    }

    /// Read a single register from the PSU.
    pub fn read_modbus_single(&mut self, register: impl Into<u16>) -> Result<u16, PortError<C>> {
        let values = self.read_modbus_bulk(register, 1)?;
        Ok(values[0])
    }

    /// Read `count` sequential registers from the PSU, starting at `start_register`.
    ///
    /// The returned vector always holds exactly `count` values.
    pub fn read_modbus_bulk(
        &mut self,
        start_register: impl Into<u16>,
        count: u16,
    ) -> Result<heapless::Vec<u16, 32>, PortError<C>> {
        if count == 0 || count > frame::MAX_READ_COUNT {
            return Err(Error::InvalidRange);
        }
        let mut request: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req =
            rmodbus::client::ModbusRequest::new(self.config.device_id, rmodbus::ModbusProto::Rtu);
        req.generate_get_holdings(start_register.into(), count, &mut request)?;

        let response = self.transact(&request, frame::read_response_len(count))?;
        frame::validate::<PortError<C>>(&response, self.config.device_id, READ_HOLDINGS)?;

        let mut values: heapless::Vec<u16, 32> = heapless::Vec::new();
        req.parse_u16(&response, &mut values)?;
        if values.len() != count as usize {
            log::warn!(
                "Register count mismatch - requested={} received={}",
                count,
                values.len()
            );
            return Err(Error::InvalidResponse);
        }
        Ok(values)
    }

    /// Send one request and collect its response. An I/O failure closes the link.
    ///
    /// Input still pending from an earlier request, such as a reply that arrived after
    /// its timeout, is discarded first so it cannot be taken for this response.
    fn transact(
        &mut self,
        request: &[u8],
        expected_len: usize,
    ) -> Result<heapless::Vec<u8, L>, PortError<C>> {
        let interface = self.interface.as_mut().ok_or_else(|| {
            log::error!("RD60xx is not connected");
            Error::NotConnected
        })?;
        log::trace!("send: {:02X?}", request);
        let result = interface
            .clear_input()
            .map_err(Error::SerialError)
            .and_then(|()| exchange::<C::Port, L>(interface, request, expected_len, &self.config));
        match &result {
            Ok(response) => log::trace!("receive: {:02X?}", response.as_slice()),
            Err(err) if err.closes_link() => {
                log::error!("Serial link to {} lost: {}", self.config.port, err);
                self.interface = None;
            }
            Err(err) => log::warn!("Request failed: {}", err),
        }
        result
    }
}

/// Write `request` and read back exactly one response frame.
///
/// Reads stop once the frame is complete so nothing of a following frame is consumed.
/// The configured timeout is one deadline for the whole frame: every read may only
/// block for the time left. A frame that is still incomplete at the deadline is an
/// invalid response, no frame at all is a timeout.
fn exchange<S: SerialLink, const L: usize>(
    interface: &mut S,
    request: &[u8],
    expected_len: usize,
    config: &PortConfig,
) -> Result<heapless::Vec<u8, L>, S::Error> {
    let deadline = Instant::now().checked_add(config.timeout).ok_or_else(|| {
        log::error!("Timeout {:?} out of range", config.timeout);
        Error::InvalidRange
    })?;

    interface.write_all(request).map_err(Error::SerialError)?;
    interface.flush().map_err(Error::SerialError)?;

    let timed_out = |received: &[u8]| {
        if received.is_empty() {
            Error::Timeout
        } else {
            log::warn!("Truncated response: {:02X?}", received);
            Error::InvalidResponse
        }
    };

    let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
    let mut temp_buf = [0u8; 8];
    loop {
        let target = frame::target_len(&buff, expected_len);
        if buff.len() >= target {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(&buff));
        }
        interface
            .set_read_timeout(remaining)
            .map_err(Error::SerialError)?;

        let wanted = (target - buff.len()).min(temp_buf.len());
        match interface.read(&mut temp_buf[..wanted]) {
            Ok(bytes_read) => {
                if buff.extend_from_slice(&temp_buf[..bytes_read]).is_err() {
                    return Err(Error::BufferError);
                }
            }
            // The deadline decides when to give up, not the port.
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut) => continue,
            Err(e) => return Err(Error::SerialError(e)),
        }
    }
    Ok(buff)
}
