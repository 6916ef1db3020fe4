//! Lines the device sends to the host.
//!
//! The `Display` impl of [`Event`] is the exact wire text, without the line terminator.

use core::fmt;

use crate::types::{CHANNEL_COUNT, ChannelId, ControlState, Limit, Range};

/// One channel's slot in a telemetry line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub channel: ChannelId,
    /// Milliamps.
    pub current: Option<f64>,
    /// Volts.
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// `<time_s> a <I> <V> b <I> <V> c <I> <V>`
    Telemetry {
        time_ms: u64,
        samples: [Sample; CHANNEL_COUNT],
    },
    /// `Range <index>`
    Range(Range),
    /// `CH <name> PushPullConnected <True|False>`
    Connection { channel: ChannelId, connected: bool },
    /// `State <name> <state>`
    ControlState {
        channel: ChannelId,
        state: ControlState,
    },
    /// `CH <name> Alert <message>`
    Alert { channel: ChannelId, limit: Limit },
    /// `STATE <range|None> <conn_a> <conn_b> <conn_c>`
    PanelState {
        range: Option<Range>,
        connected: [bool; CHANNEL_COUNT],
    },
}

/// Host tooling compares against these literals.
fn flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// A measurement, or `None` when unavailable.
struct Value(Option<f64>);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            // Debug keeps the decimal point on whole numbers.
            Some(value) => write!(f, "{:?}", value),
            None => f.write_str("None"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Telemetry { time_ms, samples } => {
                write!(f, "{:?}", *time_ms as f64 / 1000.0)?;
                for sample in samples {
                    write!(
                        f,
                        " {} {} {}",
                        sample.channel,
                        Value(sample.current),
                        Value(sample.voltage)
                    )?;
                }
                Ok(())
            }
            Event::Range(range) => write!(f, "Range {}", range),
            Event::Connection { channel, connected } => {
                write!(f, "CH {} PushPullConnected {}", channel, flag(*connected))
            }
            Event::ControlState { channel, state } => write!(f, "State {} {}", channel, state),
            Event::Alert { channel, limit } => write!(f, "CH {} Alert {}", channel, limit),
            Event::PanelState { range, connected } => {
                match range {
                    Some(range) => write!(f, "STATE {}", range)?,
                    None => f.write_str("STATE None")?,
                }
                for connected in connected {
                    write!(f, " {}", flag(*connected))?;
                }
                Ok(())
            }
        }
    }
}
