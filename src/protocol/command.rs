//! Parsing of the lines the host sends.

use core::str::FromStr;

use crate::types::{ChannelId, SetpointMode};

/// A parsed host command. Every line maps to exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `<name> nc`: the output is not used by the current measurement.
    Unused(ChannelId),
    /// `<name> v` or `<name> i`.
    SelectMode(ChannelId, SetpointMode),
    /// `<name> <number>`: target for the active mode.
    Setpoint(ChannelId, f64),
    /// `<name> <number>w`: power ceiling in watts.
    MaxPower(ChannelId, f64),
    /// `set sampling <hz>`.
    SetSampling(f64),
    /// `<any> voffset <volts>`. Reserved, not supported by the hardware.
    VoltageOffset(f64),
    /// `<any> <any> STATE`: report the panel state now.
    ReportState,
    Unrecognized(Rejection),
}

/// Why a line was not understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownChannel,
    InvalidParameter,
    InvalidNumber,
    WrongTokenCount,
    UnknownKeyword,
}

impl Command {
    /// Parse one trimmed, non-empty line.
    pub fn parse(line: &str) -> Self {
        let mut tokens: heapless::Vec<&str, 4> = heapless::Vec::new();
        for token in line.split_whitespace() {
            if tokens.push(token).is_err() {
                return Command::Unrecognized(Rejection::WrongTokenCount);
            }
        }

        match tokens.as_slice() {
            [channel, parameter] => parse_channel_command(channel, parameter),
            [_, "sampling", hz] => match parse_number(hz) {
                Some(hz) if hz > 0.0 => Command::SetSampling(hz),
                _ => Command::Unrecognized(Rejection::InvalidNumber),
            },
            [_, _, "STATE"] => Command::ReportState,
            [_, "voffset", volts] => match parse_number(volts) {
                Some(volts) => Command::VoltageOffset(volts),
                None => Command::Unrecognized(Rejection::InvalidNumber),
            },
            [_, _, _] => Command::Unrecognized(Rejection::UnknownKeyword),
            _ => Command::Unrecognized(Rejection::WrongTokenCount),
        }
    }
}

fn parse_channel_command(channel: &str, parameter: &str) -> Command {
    let Ok(channel) = ChannelId::from_str(channel) else {
        return Command::Unrecognized(Rejection::UnknownChannel);
    };

    match parameter {
        "nc" => Command::Unused(channel),
        "v" => Command::SelectMode(channel, SetpointMode::Voltage),
        "i" => Command::SelectMode(channel, SetpointMode::Current),
        _ => {
            if let Some(value) = parse_number(parameter) {
                return Command::Setpoint(channel, value);
            }
            match parameter.strip_suffix('w') {
                Some(watts) => match parse_number(watts) {
                    Some(watts) if watts > 0.0 => Command::MaxPower(channel, watts),
                    _ => Command::Unrecognized(Rejection::InvalidNumber),
                },
                None => Command::Unrecognized(Rejection::InvalidParameter),
            }
        }
    }
}

/// Finite decimal number, or `None`.
fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|value| value.is_finite())
}
