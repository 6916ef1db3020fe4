//! Picks the power monitor that matches the selected range and scales its readings.

use crate::{
    config::REFERENCE_SHUNT_OHMS,
    error::SensorError,
    panel::PanelState,
    types::ChannelId,
};

/// A device measuring bus voltage and shunt current on each channel.
pub trait PowerMonitor {
    /// Bus voltage in volts.
    fn bus_voltage(&mut self, channel: ChannelId) -> Result<f64, SensorError>;

    /// Current in amps, computed for a shunt of [`REFERENCE_SHUNT_OHMS`].
    fn current(&mut self, channel: ChannelId) -> Result<f64, SensorError>;
}

/// A calibrated measurement of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Volts.
    pub voltage: f64,
    /// Milliamps, `None` when no valid shunt is selected.
    pub current: Option<f64>,
}

/// Routes reads to the high-current monitor on the 0.1 ohm range and to the
/// low-current monitor otherwise.
pub struct SensorArbiter<H: PowerMonitor, L: PowerMonitor> {
    high: H,
    low: L,
}

impl<H: PowerMonitor, L: PowerMonitor> SensorArbiter<H, L> {
    pub fn new(high: H, low: L) -> Self {
        Self { high, low }
    }

    /// Take one reading. A single attempt, no retries.
    pub fn read(&mut self, channel: ChannelId, panel: &PanelState) -> Result<Reading, SensorError> {
        let high_path = panel.range().is_some_and(|range| range.uses_high_current_path());
        if high_path {
            sample(&mut self.high, channel, panel.shunt_ohms())
        } else {
            sample(&mut self.low, channel, panel.shunt_ohms())
        }
    }

    pub fn monitors(&mut self) -> (&mut H, &mut L) {
        (&mut self.high, &mut self.low)
    }
}

fn sample<M: PowerMonitor>(
    monitor: &mut M,
    channel: ChannelId,
    shunt_ohms: Option<f64>,
) -> Result<Reading, SensorError> {
    let voltage = monitor.bus_voltage(channel)?;
    let current = match shunt_ohms {
        Some(ohms) => {
            let amps = monitor.current(channel)?;
            Some(1e3 * amps * REFERENCE_SHUNT_OHMS / ohms)
        }
        None => None,
    };

    if !voltage.is_finite() || current.is_some_and(|i| !i.is_finite()) {
        return Err(SensorError::InvalidReading);
    }
    Ok(Reading { voltage, current })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_hal::MockMonitor;
    use crate::types::Range;

    fn arbiter() -> (SensorArbiter<MockMonitor, MockMonitor>, MockMonitor, MockMonitor) {
        let high = MockMonitor::new();
        let low = MockMonitor::new();
        (SensorArbiter::new(high.clone(), low.clone()), high, low)
    }

    #[test]
    fn low_range_reads_low_monitor() {
        let (mut arbiter, high, low) = arbiter();
        low.set(ChannelId::B, 2.5, 0.016);
        high.set(ChannelId::B, 9.9, 9.9);

        let panel = PanelState::fixed(Some(Range::Shunt10R), true);
        let reading = arbiter.read(ChannelId::B, &panel).unwrap();
        assert_eq!(reading.voltage, 2.5);
        assert!((reading.current.unwrap() - 0.16).abs() < 1e-12);
        assert_eq!(high.reads(), 0);
        assert_eq!(low.reads(), 2);
    }

    #[test]
    fn first_range_reads_high_monitor() {
        let (mut arbiter, high, low) = arbiter();
        high.set(ChannelId::A, 5.0, 0.2);

        let panel = PanelState::fixed(Some(Range::Shunt0R1), true);
        let reading = arbiter.read(ChannelId::A, &panel).unwrap();
        assert_eq!(reading.voltage, 5.0);
        assert!((reading.current.unwrap() - 200.0).abs() < 1e-9);
        assert_eq!(low.reads(), 0);
    }

    #[test]
    fn unset_shunt_keeps_voltage() {
        let (mut arbiter, _high, low) = arbiter();
        low.set(ChannelId::C, 1.25, 0.5);

        let reading = arbiter.read(ChannelId::C, &PanelState::default()).unwrap();
        assert_eq!(
            reading,
            Reading {
                voltage: 1.25,
                current: None
            }
        );
        // Only the voltage was read.
        assert_eq!(low.reads(), 1);
    }

    #[test]
    fn failures_are_errors() {
        let (mut arbiter, _high, low) = arbiter();
        low.set_fail(true);
        let panel = PanelState::fixed(Some(Range::Shunt1R), true);
        assert!(arbiter.read(ChannelId::A, &panel).is_err());

        low.set_fail(false);
        low.set(ChannelId::A, f64::NAN, 0.0);
        assert_eq!(
            arbiter.read(ChannelId::A, &panel),
            Err(SensorError::InvalidReading)
        );
    }
}
