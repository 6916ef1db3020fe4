//! Driver for the TI INA3221 three-channel shunt and bus voltage monitor.
//!
//! Channel `a` is wired to the monitor's channel 1, `b` to 2 and `c` to 3.

use embedded_hal::i2c::I2c;
use modular_bitfield::prelude::*;

use crate::{
    config::REFERENCE_SHUNT_OHMS,
    error::SensorError,
    sensor::PowerMonitor,
    types::ChannelId,
};

/// Address with A0 tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x40;

const REG_CONFIG: u8 = 0x00;
/// Shunt voltage of channel 1. Channel n is at `0x01 + 2 * (n - 1)`.
const REG_SHUNT_VOLTAGE: u8 = 0x01;
/// Bus voltage of channel 1. Channel n is at `0x02 + 2 * (n - 1)`.
const REG_BUS_VOLTAGE: u8 = 0x02;

/// Shunt voltage LSB, 40 uV.
const SHUNT_LSB_V: f64 = 40e-6;
/// Bus voltage LSB, 8 mV.
const BUS_LSB_V: f64 = 8e-3;

/// Configuration register, bit 0 first.
#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRegister {
    /// Operating mode, 7 is continuous shunt and bus.
    pub mode: B3,
    pub shunt_conversion_time: B3,
    pub bus_conversion_time: B3,
    pub averaging: B3,
    pub channel3_enable: bool,
    pub channel2_enable: bool,
    pub channel1_enable: bool,
    pub reset: bool,
}

impl ConfigRegister {
    /// Power-on value: all channels, 1.1 ms conversions, continuous.
    pub const POWER_ON: u16 = 0x7127;

    pub fn from_raw(raw: u16) -> Self {
        ConfigRegister::from_bytes(raw.to_le_bytes())
    }

    pub fn to_raw(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }

    pub fn channel_enabled(&self, channel: ChannelId) -> bool {
        match channel {
            ChannelId::A => self.channel1_enable(),
            ChannelId::B => self.channel2_enable(),
            ChannelId::C => self.channel3_enable(),
        }
    }

    pub fn set_channel_enabled(&mut self, channel: ChannelId, enabled: bool) {
        match channel {
            ChannelId::A => self.set_channel1_enable(enabled),
            ChannelId::B => self.set_channel2_enable(enabled),
            ChannelId::C => self.set_channel3_enable(enabled),
        }
    }
}

impl Default for ConfigRegister {
    fn default() -> Self {
        ConfigRegister::from_raw(ConfigRegister::POWER_ON)
    }
}

pub struct Ina3221<I2C: I2c> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ina3221<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn config(&mut self) -> Result<ConfigRegister, SensorError> {
        Ok(ConfigRegister::from_raw(self.read_u16(REG_CONFIG)?))
    }

    pub fn set_config(&mut self, config: ConfigRegister) -> Result<(), SensorError> {
        self.write_u16(REG_CONFIG, config.to_raw())
    }

    /// Turn on measurement of one channel, leaving the rest of the configuration alone.
    pub fn enable_channel(&mut self, channel: ChannelId) -> Result<(), SensorError> {
        let mut config = self.config()?;
        if !config.channel_enabled(channel) {
            config.set_channel_enabled(channel, true);
            self.set_config(config)?;
        }
        Ok(())
    }

    /// Voltage across the shunt in volts.
    pub fn shunt_voltage(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        let raw = self.read_u16(REG_SHUNT_VOLTAGE + 2 * channel.index() as u8)?;
        Ok(decode(raw) * SHUNT_LSB_V)
    }

    /// Voltage on the bus, to ground, in volts.
    pub fn bus_voltage(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        let raw = self.read_u16(REG_BUS_VOLTAGE + 2 * channel.index() as u8)?;
        Ok(decode(raw) * BUS_LSB_V)
    }

    /// Current in amps, assuming the reference shunt.
    pub fn current(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        Ok(self.shunt_voltage(channel)? / REFERENCE_SHUNT_OHMS)
    }

    fn write_u16(&mut self, register: u8, value: u16) -> Result<(), SensorError> {
        let [high, low] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register, high, low])
            .map_err(SensorError::from_i2c)
    }

    fn read_u16(&mut self, register: u8) -> Result<u16, SensorError> {
        let mut buffer = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buffer)
            .map_err(SensorError::from_i2c)?;
        Ok(u16::from_be_bytes(buffer))
    }
}

/// Measurement registers hold a 13-bit two's complement value in bits 15..3.
fn decode(raw: u16) -> f64 {
    ((raw as i16) >> 3) as f64
}

impl<I2C: I2c> PowerMonitor for Ina3221<I2C> {
    fn bus_voltage(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        Ina3221::bus_voltage(self, channel)
    }

    fn current(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        Ina3221::current(self, channel)
    }
}
