//! Firmware core for a three-channel programmable voltage/current source.
//!
//! It supports `no-std` environments by use of the `no-std` feature flag.
//!
//! Each channel (`a`, `b`, `c`) drives its output through a 16-bit PWM and is closed
//! loop regulated towards either a voltage or a current setpoint. Current is measured
//! across one of five panel selected shunts:
//!
//! | Range | Shunt    | Max current | Monitor |
//! |-------|----------|-------------|---------|
//! | 0     | 0.1 ohm  | 1 A         | high    |
//! | 1     | 1 ohm    | 100 mA      | low     |
//! | 2     | 10 ohm   | 1 mA        | low     |
//! | 3     | 100 ohm  | 100 uA      | low     |
//! | 4     | 1 kohm   | 10 uA       | low     |
//!
//! A supervisor opens the channel relay when voltage, current or power go out of
//! bounds, and a panel button re-engages every relay.
//!
//! The host talks to the device over a line oriented text protocol. The serial port
//! should be configured like so:
//! * Default baud rate: 115200
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Commands, one per line:
//! * `<ch> v` / `<ch> i` select voltage or current regulation
//! * `<ch> <number>` set the setpoint, in volts or milliamps
//! * `<ch> <number>w` set the power limit in watts
//! * `<any> sampling <hz>` set the telemetry rate
//! * `<any> <any> STATE` report the panel state

#![cfg_attr(feature = "no-std", no_std)]

pub mod channel;
pub mod config;
pub mod error;
pub mod firmware;
pub mod ina3221;
pub mod panel;
pub mod protocol;
pub mod regulator;
pub mod scheduler;
pub mod sensor;
pub mod supervisor;
pub mod types;

pub use channel::{Channel, Instant, Registry};
pub use config::Config;
pub use firmware::{Board, Firmware, Peripherals};

#[cfg(test)]
mod mock_hal;
#[cfg(test)]
mod mock_serial;
