//! Regulation, protection and task timing parameters.
//!
//! The constants are the values the board ships with. Use [`ConfigBuilder`] to
//! override any of them; [`ConfigBuilder::build`] rejects values that would make
//! the control loop or the scheduler misbehave.

use fugit::MillisDurationU64;
use thiserror::Error;

/// Full scale of the PWM duty cycle. The output stage inverts, so this is 0 V.
pub const DUTY_MAX: u16 = u16::MAX;

/// Period of every regulator tick.
pub const PID_DT_MS: u64 = 5;
/// Largest duty change allowed in one tick.
pub const MAX_PWM_INCREMENT: u16 = 1000;
pub const KP: f64 = 5e-3;
pub const KI: f64 = 1e-4;
pub const KD: f64 = 5e-1;
/// Leak applied to the integrator after every tick.
pub const INTEGRAL_DECAY: f64 = 0.99;
/// Floor for the current setpoint, in milliamps, used as the error denominator.
pub const MIN_CURRENT_SETPOINT_MA: f64 = 1e-6;

/// Output voltage above which a relay is opened, in volts.
pub const MAX_VOLTAGE: f64 = 8.0;
/// Consecutive failed sensor reads after which the supervisor opens the relay.
pub const SENSOR_FAULT_LIMIT: u32 = 10;
/// Shunt the power monitors assume when reporting current, in ohms.
pub const REFERENCE_SHUNT_OHMS: f64 = 0.1;

pub const SUPERVISOR_PERIOD_MS: u64 = 100;
pub const PANEL_PERIOD_MS: u64 = 50;
pub const COMMAND_PERIOD_MS: u64 = 10;
pub const STATE_REPORT_PERIOD_MS: u64 = 500;
/// Telemetry lines per second until the host asks for something else.
pub const DEFAULT_SAMPLING_HZ: f64 = 1.0;
/// Longest telemetry period, about 49 days.
pub const MAX_TELEMETRY_PERIOD_MS: u64 = u32::MAX as u64;

/// Duty fractions a channel must be strictly between to be reported as regulating again.
pub const REGULATING_BAND: (f64, f64) = (0.05, 0.95);

/// PID gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Gains {
            kp: KP,
            ki: KI,
            kd: KD,
        }
    }
}

/// Everything tunable about the firmware. Build one with [`ConfigBuilder`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub gains: Gains,
    pub pid_period: MillisDurationU64,
    pub max_pwm_increment: u16,
    pub integral_decay: f64,
    pub max_voltage: f64,
    pub sensor_fault_limit: u32,
    /// Also clear the regulator integrator when the supervisor trips a relay.
    pub reset_integrator_on_trip: bool,
    pub regulating_band: (f64, f64),
    pub supervisor_period: MillisDurationU64,
    pub panel_period: MillisDurationU64,
    pub command_period: MillisDurationU64,
    pub state_report_period: MillisDurationU64,
    pub sampling_hz: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gains: Gains::default(),
            pid_period: MillisDurationU64::millis(PID_DT_MS),
            max_pwm_increment: MAX_PWM_INCREMENT,
            integral_decay: INTEGRAL_DECAY,
            max_voltage: MAX_VOLTAGE,
            sensor_fault_limit: SENSOR_FAULT_LIMIT,
            reset_integrator_on_trip: false,
            regulating_band: REGULATING_BAND,
            supervisor_period: MillisDurationU64::millis(SUPERVISOR_PERIOD_MS),
            panel_period: MillisDurationU64::millis(PANEL_PERIOD_MS),
            command_period: MillisDurationU64::millis(COMMAND_PERIOD_MS),
            state_report_period: MillisDurationU64::millis(STATE_REPORT_PERIOD_MS),
            sampling_hz: DEFAULT_SAMPLING_HZ,
        }
    }
}

impl Config {
    /// Regulator tick period in milliseconds, the `dt` the gains are tuned for.
    pub fn dt_ms(&self) -> f64 {
        self.pid_period.ticks() as f64
    }

    /// Telemetry period for a sampling frequency. Never shorter than 1 ms nor longer
    /// than [`MAX_TELEMETRY_PERIOD_MS`].
    pub fn telemetry_period(sampling_hz: f64) -> MillisDurationU64 {
        let millis = (1000.0 / sampling_hz).min(MAX_TELEMETRY_PERIOD_MS as f64) as u64;
        MillisDurationU64::millis(millis.max(1))
    }
}

/// Use this type to create a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let's build it!
    pub fn build(self) -> Result<Config, ConfigError> {
        let c = self.config;

        let gains = [c.gains.kp, c.gains.ki, c.gains.kd];
        if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
            return Err(ConfigError::InvalidGains);
        }
        let periods = [
            c.pid_period,
            c.supervisor_period,
            c.panel_period,
            c.command_period,
            c.state_report_period,
        ];
        if periods.iter().any(|p| p.ticks() == 0) {
            return Err(ConfigError::ZeroPeriod);
        }
        if c.max_pwm_increment == 0 {
            return Err(ConfigError::ZeroSlewLimit);
        }
        if c.sensor_fault_limit == 0 {
            return Err(ConfigError::ZeroFaultLimit);
        }
        if !(c.integral_decay > 0.0 && c.integral_decay <= 1.0) {
            return Err(ConfigError::InvalidDecay);
        }
        let (low, high) = c.regulating_band;
        if !(0.0 < low && low < high && high < 1.0) {
            return Err(ConfigError::InvalidBand);
        }
        if !(c.max_voltage.is_finite() && c.max_voltage > 0.0) {
            return Err(ConfigError::InvalidMaxVoltage);
        }
        if !(c.sampling_hz.is_finite() && c.sampling_hz > 0.0) {
            return Err(ConfigError::InvalidSampling);
        }

        Ok(c)
    }

    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.config.gains = Gains { kp, ki, kd };
        self
    }

    pub fn with_pid_period(mut self, period: MillisDurationU64) -> Self {
        self.config.pid_period = period;
        self
    }

    /// Set the slew limit, in duty counts per tick.
    pub fn with_max_pwm_increment(mut self, increment: u16) -> Self {
        self.config.max_pwm_increment = increment;
        self
    }

    pub fn with_integral_decay(mut self, decay: f64) -> Self {
        self.config.integral_decay = decay;
        self
    }

    /// Set the absolute voltage ceiling, in volts.
    pub fn with_max_voltage(mut self, volts: f64) -> Self {
        self.config.max_voltage = volts;
        self
    }

    pub fn with_sensor_fault_limit(mut self, ticks: u32) -> Self {
        self.config.sensor_fault_limit = ticks;
        self
    }

    pub fn with_reset_integrator_on_trip(mut self, reset: bool) -> Self {
        self.config.reset_integrator_on_trip = reset;
        self
    }

    /// Set the duty fractions (of full scale) bounding the regulating band.
    pub fn with_regulating_band(mut self, low: f64, high: f64) -> Self {
        self.config.regulating_band = (low, high);
        self
    }

    pub fn with_supervisor_period(mut self, period: MillisDurationU64) -> Self {
        self.config.supervisor_period = period;
        self
    }

    pub fn with_panel_period(mut self, period: MillisDurationU64) -> Self {
        self.config.panel_period = period;
        self
    }

    pub fn with_command_period(mut self, period: MillisDurationU64) -> Self {
        self.config.command_period = period;
        self
    }

    pub fn with_state_report_period(mut self, period: MillisDurationU64) -> Self {
        self.config.state_report_period = period;
        self
    }

    pub fn with_sampling_hz(mut self, hz: f64) -> Self {
        self.config.sampling_hz = hz;
        self
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Gains must be finite and not negative")]
    InvalidGains,
    #[error("Task periods must be non-zero")]
    ZeroPeriod,
    #[error("Slew limit must be non-zero")]
    ZeroSlewLimit,
    #[error("Sensor fault limit must be non-zero")]
    ZeroFaultLimit,
    #[error("Integral decay must be in (0, 1]")]
    InvalidDecay,
    #[error("Regulating band must be ordered and inside (0, 1)")]
    InvalidBand,
    #[error("Max voltage must be positive")]
    InvalidMaxVoltage,
    #[error("Sampling frequency must be positive")]
    InvalidSampling,
}
