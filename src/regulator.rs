//! Per-channel PID loop driving the output stage PWM.
//!
//! The output stage is inverting: a duty of [`DUTY_MAX`] gives 0 V, a duty of 0 gives
//! full output. The regulator therefore subtracts its correction from the duty.

use embedded_hal::pwm::{Error as _, SetDutyCycle};
use heapless::Deque;
use log::{debug, error, warn};

use crate::{
    config::{Config, DUTY_MAX, MIN_CURRENT_SETPOINT_MA},
    error::SensorError,
    panel::PanelState,
    protocol::CommandState,
    sensor::Reading,
    supervisor::SafetyState,
    types::{ChannelId, Setpoint},
};

/// Number of load samples kept per channel.
pub const LOAD_HISTORY_LEN: usize = 11;

/// Load reported when no current flows, in ohms.
const OPEN_CIRCUIT_OHMS: f64 = 1e6;

/// Regulator memory and the last measurement of one channel.
///
/// Only the regulator writes this. The supervisor may force the output to its safe
/// level through [`RegulationState::force_safe_output`].
#[derive(Debug, Clone)]
pub struct RegulationState {
    duty: u16,
    measured_voltage: Option<f64>,
    measured_current: Option<f64>,
    integral: f64,
    previous_error: f64,
    load_history: Deque<f64, LOAD_HISTORY_LEN>,
    sensor_faults: u32,
}

impl Default for RegulationState {
    fn default() -> Self {
        Self {
            duty: DUTY_MAX,
            measured_voltage: None,
            measured_current: None,
            integral: 0.0,
            previous_error: 0.0,
            load_history: Deque::new(),
            sensor_faults: 0,
        }
    }
}

impl RegulationState {
    pub fn duty(&self) -> u16 {
        self.duty
    }

    /// Last measured output voltage in volts.
    pub fn measured_voltage(&self) -> Option<f64> {
        self.measured_voltage
    }

    /// Last measured output current in milliamps.
    pub fn measured_current(&self) -> Option<f64> {
        self.measured_current
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn previous_error(&self) -> f64 {
        self.previous_error
    }

    /// Consecutive ticks whose sensor read failed.
    pub fn sensor_faults(&self) -> u32 {
        self.sensor_faults
    }

    /// Mean of the recent load samples in ohms, if any were taken.
    pub fn load_ohms(&self) -> Option<f64> {
        if self.load_history.is_empty() {
            return None;
        }
        let sum: f64 = self.load_history.iter().sum();
        Some(sum / self.load_history.len() as f64)
    }

    /// Drive the output to zero. Used when a relay trips.
    pub(crate) fn force_safe_output(&mut self, reset_integrator: bool) {
        self.duty = DUTY_MAX;
        if reset_integrator {
            self.integral = 0.0;
            self.previous_error = 0.0;
        }
    }

    fn record(&mut self, reading: &Reading) {
        self.measured_voltage = Some(reading.voltage);
        self.measured_current = reading.current;
        self.sensor_faults = 0;

        if let Some(current) = reading.current {
            let load = if current == 0.0 {
                OPEN_CIRCUIT_OHMS
            } else {
                1e3 * reading.voltage / current
            };
            if self.load_history.is_full() {
                self.load_history.pop_front();
            }
            // Room was made above.
            let _ = self.load_history.push_back(load);
        }
    }

    fn record_fault(&mut self) {
        self.measured_voltage = None;
        self.measured_current = None;
        self.sensor_faults = self.sensor_faults.saturating_add(1);
    }

    #[cfg(test)]
    pub(crate) fn set_duty(&mut self, duty: u16) {
        self.duty = duty;
    }

    #[cfg(test)]
    pub(crate) fn set_measurements(&mut self, voltage: Option<f64>, current: Option<f64>) {
        self.measured_voltage = voltage;
        self.measured_current = current;
    }

    #[cfg(test)]
    pub(crate) fn set_memory(&mut self, integral: f64, previous_error: f64) {
        self.integral = integral;
        self.previous_error = previous_error;
    }

    #[cfg(test)]
    pub(crate) fn set_sensor_faults(&mut self, faults: u32) {
        self.sensor_faults = faults;
    }
}

/// What a regulator tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The sensor read failed; nothing else happened.
    Fault(SensorError),
    /// A measurement was missing or the error could not be computed.
    Skipped,
    /// Output disconnected or relay open; duty held.
    Held,
    /// New duty written to the PWM.
    Actuated(u16),
}

/// PID regulator of one channel. Owns the channel's PWM output.
pub struct Regulator<P: SetDutyCycle> {
    channel: ChannelId,
    pwm: P,
    config: Config,
}

impl<P: SetDutyCycle> Regulator<P> {
    pub fn new(channel: ChannelId, pwm: P, config: &Config) -> Self {
        Self {
            channel,
            pwm,
            config: *config,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Run one regulation step from a fresh sensor reading.
    pub fn tick(
        &mut self,
        reading: Result<Reading, SensorError>,
        state: &mut RegulationState,
        command: &CommandState,
        panel: &PanelState,
        safety: &SafetyState,
    ) -> Outcome {
        let reading = match reading {
            Ok(reading) => reading,
            Err(err) => {
                state.record_fault();
                warn!(
                    "Channel {}: sensor read failed ({}), {} in a row",
                    self.channel, err, state.sensor_faults
                );
                return Outcome::Fault(err);
            }
        };
        state.record(&reading);

        let Some(current) = reading.current else {
            return Outcome::Skipped;
        };

        if !panel.connected() || !safety.relay_engaged() {
            self.write_duty(state.duty);
            return Outcome::Held;
        }

        let error = match command.setpoint() {
            Setpoint::Voltage(target) => target - reading.voltage,
            Setpoint::Current(target) => 1.0 - current / target.max(MIN_CURRENT_SETPOINT_MA),
        };
        if !error.is_finite() {
            warn!(
                "Channel {}: cannot compute error for {:?}",
                self.channel,
                command.setpoint()
            );
            return Outcome::Skipped;
        }

        let duty = self.step(state, error);
        self.write_duty(duty);
        Outcome::Actuated(duty)
    }

    fn step(&self, state: &mut RegulationState, error: f64) -> u16 {
        let dt = self.config.dt_ms();
        let gains = self.config.gains;

        state.integral += error * dt;
        let derivative = (error - state.previous_error) / dt;

        let raw = (gains.kp * error + gains.kd * derivative + gains.ki * state.integral)
            * DUTY_MAX as f64;
        let limit = self.config.max_pwm_increment as f64;
        let increment = libm::round(raw.clamp(-limit, limit));

        let target = state.duty as f64 - increment;
        let duty = if target < 0.0 {
            state.integral = 0.0;
            0
        } else if target > DUTY_MAX as f64 {
            state.integral = 0.0;
            DUTY_MAX
        } else {
            target as u16
        };

        state.integral *= self.config.integral_decay;
        state.previous_error = error;
        state.duty = duty;

        debug!(
            "Channel {}: error {:.4} integral {:.4} duty {}",
            self.channel, error, state.integral, duty
        );
        duty
    }

    fn write_duty(&mut self, duty: u16) {
        if let Err(err) = self.pwm.set_duty_cycle_fraction(duty, DUTY_MAX) {
            error!("Channel {}: PWM write failed: {:?}", self.channel, err.kind());
        }
    }
}
