//! Host protocol: line parsing, command dispatch and the events reported back.

mod command;
mod event;
mod link;

pub use command::{Command, Rejection};
pub use event::{Event, Sample};
pub use link::{Commands, Link, MAX_COMMANDS};

use log::{info, warn};

use crate::{
    channel::{Channel, Registry},
    config::{DEFAULT_SAMPLING_HZ, DUTY_MAX},
    types::{CHANNEL_COUNT, ControlState, Limit, Setpoint, SetpointMode},
};

/// Anything that can carry events to the host.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl<const N: usize> EventSink for heapless::Vec<Event, N> {
    fn emit(&mut self, event: Event) {
        if self.push(event).is_err() {
            warn!("Event buffer full, dropping \"{}\"", event);
        }
    }
}

/// Host-set parameters of one channel. Only the protocol engine writes this.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandState {
    setpoint: Setpoint,
    max_power_mw: Option<f64>,
}

impl CommandState {
    pub fn with_setpoint(setpoint: Setpoint) -> Self {
        Self {
            setpoint,
            max_power_mw: None,
        }
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    /// Target in volts, when regulating voltage.
    pub fn voltage_setpoint(&self) -> Option<f64> {
        self.setpoint.voltage()
    }

    /// Target in milliamps, when regulating current.
    pub fn current_setpoint(&self) -> Option<f64> {
        self.setpoint.current()
    }

    pub fn max_power_mw(&self) -> Option<f64> {
        self.max_power_mw
    }

    #[cfg(test)]
    pub(crate) fn set_max_power_mw(&mut self, max_power_mw: f64) {
        self.max_power_mw = Some(max_power_mw);
    }
}

/// What was last reported to the host about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportState {
    control_state: ControlState,
}

impl ReportState {
    pub fn control_state(&self) -> ControlState {
        self.control_state
    }
}

/// Global settings changed from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    sampling_hz: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_HZ)
    }
}

impl Settings {
    pub fn new(sampling_hz: f64) -> Self {
        Self { sampling_hz }
    }

    /// Telemetry lines per second.
    pub fn sampling_hz(&self) -> f64 {
        self.sampling_hz
    }
}

/// Side effect of a command outside the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    None,
    /// The telemetry task must be rescheduled at this frequency.
    SamplingChanged(f64),
}

/// Apply one command to the registry.
pub fn dispatch(command: Command, registry: &mut Registry, sink: &mut impl EventSink) -> Effect {
    match command {
        Command::Unused(channel) => {
            info!("Channel {}: output not used", channel);
        }
        Command::SelectMode(channel, mode) => {
            let state = &mut registry.channel_mut(channel).command;
            if state.setpoint.mode() != mode {
                state.setpoint = Setpoint::zero(mode);
                match mode {
                    SetpointMode::Voltage => info!("Channel {}: voltage regulation", channel),
                    SetpointMode::Current => info!("Channel {}: current regulation", channel),
                }
            }
        }
        Command::Setpoint(channel, value) => {
            let state = &mut registry.channel_mut(channel).command;
            state.setpoint = state.setpoint.with_value(value);
            info!("Channel {}: setpoint {:?}", channel, state.setpoint);
        }
        Command::MaxPower(channel, watts) => {
            registry.channel_mut(channel).command.max_power_mw = Some(watts * 1000.0);
            info!("Channel {}: max power {} W", channel, watts);
        }
        Command::SetSampling(hz) => {
            registry.settings.sampling_hz = hz;
            info!("Sampling frequency {} Hz", hz);
            return Effect::SamplingChanged(hz);
        }
        Command::VoltageOffset(volts) => {
            warn!("Voltage offset of {} V requested, not supported", volts);
        }
        Command::ReportState => report_panel_state(registry, sink),
        Command::Unrecognized(reason) => {
            warn!("Unknown command ({:?})", reason);
        }
    }
    Effect::None
}

/// Publish the operating condition of every live channel that changed.
///
/// A channel is live when its relay is engaged and its output connected. Regulation
/// is only reported once the duty is strictly inside `band` (fractions of full scale).
pub fn report_control_states(
    channels: &mut [Channel; CHANNEL_COUNT],
    band: (f64, f64),
    sink: &mut impl EventSink,
) {
    let low = band.0 * DUTY_MAX as f64;
    let high = band.1 * DUTY_MAX as f64;

    for channel in channels.iter_mut() {
        if !(channel.safety.relay_engaged() && channel.panel.connected()) {
            continue;
        }
        let current = channel.report.control_state;
        let duty = channel.regulation.duty();
        let next = if duty == 0 {
            ControlState::SaturatedHigh
        } else if duty == DUTY_MAX {
            ControlState::SaturatedLow
        } else if current != ControlState::Regulating && low < duty as f64 && (duty as f64) < high
        {
            ControlState::Regulating
        } else {
            current
        };

        if next != current {
            channel.report.control_state = next;
            sink.emit(Event::ControlState {
                channel: channel.id(),
                state: next,
            });
        }
    }
}

/// Send the panel state now. Connected channels will have their control state
/// published again on the next report.
pub fn report_panel_state(registry: &mut Registry, sink: &mut impl EventSink) {
    let connected = registry.channels.each_ref().map(|c| c.panel.connected());
    for channel in registry.channels.iter_mut() {
        if channel.panel.connected() {
            channel.report.control_state = ControlState::Uninitialized;
        }
    }
    sink.emit(Event::PanelState {
        range: registry.selection.range(),
        connected,
    });
}

/// Record and publish a relay trip.
pub fn report_alert(channel: &mut Channel, limit: Limit, sink: &mut impl EventSink) {
    channel.report.control_state = ControlState::Alert;
    sink.emit(Event::Alert {
        channel: channel.id(),
        limit,
    });
}

/// Telemetry line for the current device time.
pub fn telemetry(registry: &Registry) -> Event {
    let samples = registry.channels.each_ref().map(|channel| Sample {
        channel: channel.id(),
        current: channel.regulation.measured_current(),
        voltage: channel.regulation.measured_voltage(),
    });
    Event::Telemetry {
        time_ms: registry.now().ticks(),
        samples,
    }
}
