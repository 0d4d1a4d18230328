//! Fixed-point scaling between physical units and RD60xx register values.
//!
//! The voltage and current setpoints and measurements are stored as milli-units
//! (0.001 V / 0.001 A), output power as milli-watts split over two registers and
//! input voltage as centi-volts.

/// Raw units per volt/amp/watt for the milli-unit registers.
pub const MILLI: f32 = 1000.0;

/// Raw units per volt for the input voltage register.
pub const CENTI: f32 = 100.0;

/// Highest setpoints the client will send to the PSU, in milli-units.
///
/// The default covers the whole u16 register range. Narrow it to the rating of the
/// attached model to have out-of-range requests rejected before they reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputLimits {
    pub max_voltage_mv: u16,
    pub max_current_ma: u16,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_voltage_mv: u16::MAX,
            max_current_ma: u16::MAX,
        }
    }
}

impl OutputLimits {
    pub const fn new(max_voltage_mv: u16, max_current_ma: u16) -> Self {
        Self {
            max_voltage_mv,
            max_current_ma,
        }
    }

    /// Convert a voltage setpoint in volts to its register value.
    #[inline]
    pub fn voltage_to_raw(&self, volts: f32) -> Option<u16> {
        to_milli(volts, self.max_voltage_mv)
    }

    /// Convert a current setpoint in amps to its register value.
    #[inline]
    pub fn current_to_raw(&self, amps: f32) -> Option<u16> {
        to_milli(amps, self.max_current_ma)
    }
}

/// Round `value` to the nearest milli-unit, or `None` when it is not finite, negative
/// or above `max`.
fn to_milli(value: f32, max: u16) -> Option<u16> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let scaled = (value * MILLI).round();
    if scaled > f32::from(max) {
        None
    } else {
        Some(scaled as u16)
    }
}

/// Convert a milli-unit register value to volts/amps/watts.
#[inline]
pub fn from_milli(raw: u32) -> f32 {
    raw as f32 / MILLI
}

/// Convert a centi-volt register value to volts.
#[inline]
pub fn from_centi(raw: u16) -> f32 {
    f32::from(raw) / CENTI
}

/// Join a high and low register into one 32-bit value.
#[inline]
pub const fn join_words(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}
