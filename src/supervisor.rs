//! Safety interlock: opens a channel's relay when a protection limit is crossed and
//! keeps it open until the reactivation button is pressed.

use embedded_hal::digital::{Error as _, InputPin, OutputPin};
use log::{error, info};

use crate::{
    channel::Channel,
    config::Config,
    types::{CHANNEL_COUNT, ChannelId, Limit},
};

/// State of one channel's safety relay. Only the supervisor writes this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyState {
    relay_engaged: bool,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            relay_engaged: true,
        }
    }
}

impl SafetyState {
    /// `true` when the output path is closed.
    pub fn relay_engaged(&self) -> bool {
        self.relay_engaged
    }

    #[cfg(test)]
    pub(crate) fn tripped() -> Self {
        Self {
            relay_engaged: false,
        }
    }
}

/// A relay that was just opened, and the limit that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trip {
    pub channel: ChannelId,
    pub limit: Limit,
}

/// What happened during one supervisor cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// The reactivation button was held and every relay was closed.
    pub reactivated: bool,
    pub trips: heapless::Vec<Trip, CHANNEL_COUNT>,
}

/// Drives the three relays. A relay pin driven low closes the output path.
pub struct Supervisor<R: OutputPin, B: InputPin> {
    relays: [R; CHANNEL_COUNT],
    /// Reactivation button, pressed when low.
    button: B,
    max_voltage: f64,
    sensor_fault_limit: u32,
    reset_integrator_on_trip: bool,
}

impl<R: OutputPin, B: InputPin> Supervisor<R, B> {
    pub fn new(relays: [R; CHANNEL_COUNT], button: B, config: &Config) -> Self {
        Self {
            relays,
            button,
            max_voltage: config.max_voltage,
            sensor_fault_limit: config.sensor_fault_limit,
            reset_integrator_on_trip: config.reset_integrator_on_trip,
        }
    }

    /// Close every relay. Called once at power-up.
    pub fn start(&mut self, channels: &mut [Channel; CHANNEL_COUNT]) {
        for channel in channels.iter_mut() {
            channel.safety.relay_engaged = true;
            self.drive_relay(channel.id(), true);
        }
        info!("Safety relays closed");
    }

    /// Run one supervision cycle.
    pub fn run(&mut self, channels: &mut [Channel; CHANNEL_COUNT]) -> Cycle {
        let mut cycle = Cycle::default();

        match self.button.is_low() {
            Ok(true) => {
                info!("Reactivation button held, closing all relays");
                for channel in channels.iter_mut() {
                    channel.safety.relay_engaged = true;
                    self.drive_relay(channel.id(), true);
                }
                cycle.reactivated = true;
            }
            Ok(false) => {}
            Err(err) => error!("Reactivation button read failed: {:?}", err.kind()),
        }

        for channel in channels.iter_mut() {
            let Some(limit) = self.violation(channel) else {
                continue;
            };
            if !channel.safety.relay_engaged {
                continue;
            }

            channel.safety.relay_engaged = false;
            self.drive_relay(channel.id(), false);
            channel
                .regulation
                .force_safe_output(self.reset_integrator_on_trip);
            error!("Channel {}: relay opened, {}", channel.id(), limit);

            // At most one trip per channel.
            let _ = cycle.trips.push(Trip {
                channel: channel.id(),
                limit,
            });
        }

        cycle
    }

    /// The limit a channel currently violates. When several do, the last one checked wins.
    pub fn violation(&self, channel: &Channel) -> Option<Limit> {
        let voltage = channel.regulation.measured_voltage();
        let current = channel.regulation.measured_current();
        let mut violation = None;

        if voltage.is_some_and(|v| v > self.max_voltage) {
            violation = Some(Limit::Voltage);
        }
        if let (Some(range), Some(i)) = (channel.panel.range(), current) {
            if i > range.max_current_ma() {
                violation = Some(Limit::Current);
            }
        }
        if let (Some(max_power), Some(v), Some(i)) =
            (channel.command.max_power_mw(), voltage, current)
        {
            if v * i > max_power {
                violation = Some(Limit::Power);
            }
        }
        if channel.regulation.sensor_faults() >= self.sensor_fault_limit {
            violation = Some(Limit::SensorFault);
        }

        violation
    }

    fn drive_relay(&mut self, channel: ChannelId, engaged: bool) {
        let relay = &mut self.relays[channel.index()];
        let result = if engaged {
            relay.set_low()
        } else {
            relay.set_high()
        };
        if let Err(err) = result {
            error!("Channel {}: relay drive failed: {:?}", channel, err.kind());
        }
    }
}
