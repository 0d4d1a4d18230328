//! This module is used to define the registers on the RD60xx PSUs and the values stored in them.

use core::fmt;

use strum_macros::{Display, EnumIter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Rd60xxRegister {
    /// __R__ - Product model.
    ProductModel = 0x00,
    /// __R__ - Serial number, upper 16 bits.
    SnHigh = 0x01,
    /// __R__ - Serial number, lower 16 bits.
    SnLow = 0x02,
    /// __R__ - Firmware version in hundredths. E.g. `123` => `V1.23`.
    FwVersion = 0x03,
    /// __R__ - Sign of the system temperature in Celsius.
    /// * `0` - Positive.
    /// * `1` - Negative.
    CelsiusSign = 0x04,
    /// __R__ - Magnitude of the system temperature in whole degrees Celsius.
    CelsiusValue = 0x05,
    /// __R__ - Sign of the system temperature in Fahrenheit.
    FahrenheitSign = 0x06,
    /// __R__ - Magnitude of the system temperature in whole degrees Fahrenheit.
    FahrenheitValue = 0x07,
    /// __R/W__ - Voltage setting.
    ///
    /// Value is u16 in milli-volts. E.g. 12.0V => `12000`.
    VSet = 0x08,
    /// __R/W__ - Current setting.
    ///
    /// Value is u16 in milli-amps. E.g. 1.5A => `1500`.
    ISet = 0x09,
    /// __R__ - Measured output voltage in milli-volts.
    VOut = 0x0A,
    /// __R__ - Measured output current in milli-amps.
    IOut = 0x0B,
    /// __R__ - Output power in milli-watts, upper 16 bits.
    PowerHigh = 0x0C,
    /// __R__ - Output power in milli-watts, lower 16 bits.
    PowerLow = 0x0D,
    /// __R__ - Input voltage in centi-volts.
    UIn = 0x0E,
    /// __R/W__ - Key lock.
    /// * `0` - Unlocked.
    /// * `1` - Locked.
    Lock = 0x0F,
    /// __R__ - Protect status.
    ///
    /// See [`ProtectionStatus`] for possible protection statuses.
    Protect = 0x10,
    /// __R__ - Constant voltage constant current state.
    /// * `0` - CV.
    /// * `1` - CC.
    CvCc = 0x11,
    /// __R/W__ - Switched output.
    /// * `0` - Off.
    /// * `1` - On.
    OnOff = 0x12,
    /// __W__ - Quickly call up a stored data group (0-9).
    ShortcutCallout = 0x13,
}

impl From<Rd60xxRegister> for u16 {
    fn from(value: Rd60xxRegister) -> Self {
        value as u16
    }
}

/// Represents the two possible power supply control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlMode {
    /// Constant voltage regulation mode.
    #[strum(serialize = "CV")]
    Cv,
    /// Constant current regulation mode.
    #[strum(serialize = "CC")]
    Cc,
}

impl From<u16> for ControlMode {
    fn from(value: u16) -> Self {
        match value {
            0x00 => ControlMode::Cv,
            _ => ControlMode::Cc,
        }
    }
}

/// Used to be less ambiguous and whether something is on or off.
#[repr(u16)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum State {
    /// Disabled.
    #[default]
    #[strum(serialize = "OFF")]
    Off = 0x00,
    /// Enabled.
    #[strum(serialize = "ON")]
    On = 0x01,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

/// "Protection status register".
#[derive(Debug, EnumIter, PartialEq, Eq, Clone, Copy, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ProtectionStatus {
    /// 0: Running normally, no protection tripped.
    #[strum(serialize = "RUNNING")]
    Running = 0x00,
    /// 1: OVP overvoltage protection.
    #[strum(serialize = "OVP")]
    OverVoltage = 0x01,
    /// 2: OCP overcurrent protection.
    #[strum(serialize = "OCP")]
    OverCurrent = 0x02,
    /// 3: OTP over-temperature protection.
    #[strum(serialize = "OTP")]
    OverTemperature = 0x03,
}

impl TryFrom<u16> for ProtectionStatus {
    type Error = u16;

    /// Unknown codes are handed back unchanged.
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use ProtectionStatus as PS;
        match value {
            0x00 => Ok(PS::Running),
            0x01 => Ok(PS::OverVoltage),
            0x02 => Ok(PS::OverCurrent),
            0x03 => Ok(PS::OverTemperature),
            other => Err(other),
        }
    }
}

/// Index of one of the ten data groups stored on the PSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum PresetGroup {
    M0 = 0,
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
    M5 = 5,
    M6 = 6,
    M7 = 7,
    M8 = 8,
    M9 = 9,
}

impl TryFrom<u8> for PresetGroup {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PresetGroup::*;
        let group = match value {
            0 => M0,
            1 => M1,
            2 => M2,
            3 => M3,
            4 => M4,
            5 => M5,
            6 => M6,
            7 => M7,
            8 => M8,
            9 => M9,
            other => return Err(other),
        };
        Ok(group)
    }
}

impl From<PresetGroup> for u16 {
    fn from(value: PresetGroup) -> Self {
        value as u16
    }
}

/// System temperature as reported by the PSU, in whole degrees.
///
/// The PSU reports sign and magnitude in separate registers, both are kept as read so
/// a negative zero still shows as `-0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Temperature {
    pub unit: TemperatureUnit,
    pub negative: bool,
    pub magnitude: u16,
}

impl Temperature {
    /// Build a temperature from a sign register (`0` positive, anything else negative)
    /// and a magnitude register.
    pub(crate) fn from_sign_and_value(sign: u16, value: u16, unit: TemperatureUnit) -> Self {
        Self {
            unit,
            negative: sign != 0,
            magnitude: value,
        }
    }

    /// Whole degrees in whichever unit this reading was taken.
    pub fn degrees(&self) -> i32 {
        let magnitude = i32::from(self.magnitude);
        if self.negative { -magnitude } else { magnitude }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { '-' } else { '+' };
        write!(f, "{}{}{}", sign, self.magnitude, self.unit)
    }
}

/// Unit a [`Temperature`] reading is taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TemperatureUnit {
    #[strum(to_string = "℃")]
    Celsius,
    #[strum(to_string = "℉")]
    Fahrenheit,
}
