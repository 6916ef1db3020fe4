//! This module contains the small value types shared by every part of the firmware.

use core::fmt;

use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter, EnumString, IntoStaticStr};

/// Number of output channels on the board.
pub const CHANNEL_COUNT: usize = 3;

/// Number of positions on the range selector.
pub const RANGE_COUNT: usize = 5;

/// Identifies one of the output channels. The name is what the host uses on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro, Display, EnumString, IntoStaticStr,
)]
#[repr(usize)]
pub enum ChannelId {
    #[strum(serialize = "a")]
    A = 0,
    #[strum(serialize = "b")]
    B = 1,
    #[strum(serialize = "c")]
    C = 2,
}

impl ChannelId {
    /// All channels, in the fixed order used for telemetry.
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [ChannelId::A, ChannelId::B, ChannelId::C];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name of the channel as sent over the serial link.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Position of the range selector, i.e. which shunt resistor is in circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro)]
#[repr(usize)]
pub enum Range {
    /// 0.1 ohm, read through the high-current monitor.
    Shunt0R1 = 0,
    /// 1 ohm.
    Shunt1R = 1,
    /// 10 ohm.
    Shunt10R = 2,
    /// 100 ohm.
    Shunt100R = 3,
    /// 1 kohm.
    Shunt1K = 4,
}

impl Range {
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Shunt resistance in ohms.
    pub const fn shunt_ohms(self) -> f64 {
        match self {
            Range::Shunt0R1 => 0.1,
            Range::Shunt1R => 1.0,
            Range::Shunt10R => 10.0,
            Range::Shunt100R => 100.0,
            Range::Shunt1K => 1000.0,
        }
    }

    /// Highest safe current through this shunt, in milliamps.
    pub const fn max_current_ma(self) -> f64 {
        match self {
            Range::Shunt0R1 => 1e3,
            Range::Shunt1R => 1e2,
            Range::Shunt10R => 1e0,
            Range::Shunt100R => 1e-1,
            Range::Shunt1K => 1e-2,
        }
    }

    /// Only the lowest resistance shunt is wired to the high-current monitor.
    pub const fn uses_high_current_path(self) -> bool {
        matches!(self, Range::Shunt0R1)
    }
}

impl TryFrom<usize> for Range {
    /// The rejected index.
    type Error = usize;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Range::Shunt0R1),
            1 => Ok(Range::Shunt1R),
            2 => Ok(Range::Shunt10R),
            3 => Ok(Range::Shunt100R),
            4 => Ok(Range::Shunt1K),
            other => Err(other),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Which quantity a channel regulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SetpointMode {
    #[strum(serialize = "v")]
    Voltage,
    #[strum(serialize = "i")]
    Current,
}

/// Regulation target. Holding the value inside the mode makes it impossible to
/// have a voltage and a current setpoint at the same time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Target in volts.
    Voltage(f64),
    /// Target in milliamps.
    Current(f64),
}

impl Setpoint {
    /// A zero target in the given mode.
    pub const fn zero(mode: SetpointMode) -> Self {
        match mode {
            SetpointMode::Voltage => Setpoint::Voltage(0.0),
            SetpointMode::Current => Setpoint::Current(0.0),
        }
    }

    pub const fn mode(&self) -> SetpointMode {
        match self {
            Setpoint::Voltage(_) => SetpointMode::Voltage,
            Setpoint::Current(_) => SetpointMode::Current,
        }
    }

    pub const fn value(&self) -> f64 {
        match *self {
            Setpoint::Voltage(v) | Setpoint::Current(v) => v,
        }
    }

    /// Same mode, new target.
    pub const fn with_value(&self, value: f64) -> Self {
        match self {
            Setpoint::Voltage(_) => Setpoint::Voltage(value),
            Setpoint::Current(_) => Setpoint::Current(value),
        }
    }

    pub const fn voltage(&self) -> Option<f64> {
        match *self {
            Setpoint::Voltage(v) => Some(v),
            Setpoint::Current(_) => None,
        }
    }

    pub const fn current(&self) -> Option<f64> {
        match *self {
            Setpoint::Current(i) => Some(i),
            Setpoint::Voltage(_) => None,
        }
    }
}

impl Default for Setpoint {
    fn default() -> Self {
        Setpoint::zero(SetpointMode::Voltage)
    }
}

/// Last operating condition reported to the host for a channel.
///
/// The `Display` text is the literal sent in `State` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ControlState {
    #[default]
    Uninitialized,
    #[strum(to_string = "PID Regulation")]
    Regulating,
    /// Duty at zero, i.e. the output is as high as it can go.
    #[strum(to_string = "Saturation High")]
    SaturatedHigh,
    /// Duty at full scale, i.e. the output is at its minimum.
    #[strum(to_string = "Saturation Low")]
    SaturatedLow,
    Alert,
}

/// The protection limits the safety supervisor enforces.
///
/// The `Display` text is the message sent in `Alert` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Limit {
    #[strum(to_string = "Max voltage reached")]
    Voltage,
    #[strum(to_string = "Max current reached")]
    Current,
    #[strum(to_string = "Max power reached")]
    Power,
    #[strum(to_string = "Sensor fault")]
    SensorFault,
}
