//! Top level: owns the registry and the hardware, and runs whatever task is due.

use embedded_hal::{
    digital::{InputPin, OutputPin},
    pwm::SetDutyCycle,
};
use embedded_io::{Read, ReadReady, Write};
use log::{info, warn};

use crate::{
    channel::{Instant, Registry},
    config::Config,
    error::SchedulerError,
    panel::PanelWatcher,
    protocol::{self, Effect, Event, EventSink, Link},
    regulator::Regulator,
    scheduler::{Scheduler, Task},
    sensor::{PowerMonitor, SensorArbiter},
    supervisor::Supervisor,
    types::{CHANNEL_COUNT, ChannelId, RANGE_COUNT},
};

/// The peripheral types of a board.
pub trait Board {
    /// Monitor wired across the 0.1 ohm shunt.
    type HighMonitor: PowerMonitor;
    /// Monitor used for every other range.
    type LowMonitor: PowerMonitor;
    type Pwm: SetDutyCycle;
    type Selector: InputPin;
    type Switch: InputPin;
    type Relay: OutputPin;
    type Button: InputPin;
    type Serial: Read + ReadReady + Write;
}

/// Initialised peripherals handed to [`Firmware::new`]. Arrays are in channel order
/// and, for the selector, in range order.
pub struct Peripherals<B: Board> {
    pub high_monitor: B::HighMonitor,
    pub low_monitor: B::LowMonitor,
    pub pwms: [B::Pwm; CHANNEL_COUNT],
    pub selectors: [B::Selector; RANGE_COUNT],
    pub switches: [B::Switch; CHANNEL_COUNT],
    pub relays: [B::Relay; CHANNEL_COUNT],
    pub button: B::Button,
    pub serial: B::Serial,
}

pub struct Firmware<B: Board> {
    config: Config,
    registry: Registry,
    arbiter: SensorArbiter<B::HighMonitor, B::LowMonitor>,
    regulators: [Regulator<B::Pwm>; CHANNEL_COUNT],
    supervisor: Supervisor<B::Relay, B::Button>,
    panel: PanelWatcher<B::Selector, B::Switch>,
    link: Link<B::Serial>,
    scheduler: Scheduler,
}

impl<B: Board> Firmware<B> {
    /// Close the relays and schedule every task to run at `now`.
    pub fn new(
        config: Config,
        peripherals: Peripherals<B>,
        now: Instant,
    ) -> Result<Self, SchedulerError> {
        let mut registry = Registry::new(&config, now);

        let [pwm_a, pwm_b, pwm_c] = peripherals.pwms;
        let regulators = [
            Regulator::new(ChannelId::A, pwm_a, &config),
            Regulator::new(ChannelId::B, pwm_b, &config),
            Regulator::new(ChannelId::C, pwm_c, &config),
        ];

        let mut supervisor = Supervisor::new(peripherals.relays, peripherals.button, &config);
        supervisor.start(&mut registry.channels);

        // The panel goes first so the shunt is known before the first reading.
        let mut scheduler = Scheduler::new();
        scheduler.add(Task::WatchPanel, config.panel_period, now)?;
        for channel in ChannelId::ALL {
            scheduler.add(Task::Regulate(channel), config.pid_period, now)?;
        }
        scheduler.add(Task::Supervise, config.supervisor_period, now)?;
        scheduler.add(Task::ReadCommands, config.command_period, now)?;
        scheduler.add(Task::ReportState, config.state_report_period, now)?;
        scheduler.add(
            Task::Telemetry,
            Config::telemetry_period(config.sampling_hz),
            now,
        )?;

        info!("Firmware started");
        Ok(Self {
            config,
            registry,
            arbiter: SensorArbiter::new(peripherals.high_monitor, peripherals.low_monitor),
            regulators,
            supervisor,
            panel: PanelWatcher::new(peripherals.selectors, peripherals.switches),
            link: Link::new(peripherals.serial),
            scheduler,
        })
    }

    /// Run every task due at `now`. Returns how many ran.
    pub fn poll(&mut self, now: Instant) -> usize {
        self.registry.advance(now);
        let mut ran = 0;
        while let Some(task) = self.scheduler.next_due(now) {
            self.run(task);
            ran += 1;
        }
        ran
    }

    /// When the next task falls due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn link(&mut self) -> &mut Link<B::Serial> {
        &mut self.link
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::Regulate(id) => {
                let channel = &mut self.registry.channels[id.index()];
                let reading = self.arbiter.read(id, &channel.panel);
                self.regulators[id.index()].tick(
                    reading,
                    &mut channel.regulation,
                    &channel.command,
                    &channel.panel,
                    &channel.safety,
                );
            }
            Task::Supervise => {
                let cycle = self.supervisor.run(&mut self.registry.channels);
                if cycle.reactivated {
                    for channel in self.registry.channels.iter() {
                        self.link.emit(Event::Connection {
                            channel: channel.id(),
                            connected: channel.panel.connected(),
                        });
                    }
                }
                for trip in cycle.trips {
                    let channel = &mut self.registry.channels[trip.channel.index()];
                    protocol::report_alert(channel, trip.limit, &mut self.link);
                }
            }
            Task::WatchPanel => self.panel.poll(
                &mut self.registry.selection,
                &mut self.registry.channels,
                &mut self.link,
            ),
            Task::ReadCommands => match self.link.poll() {
                Ok(commands) => {
                    for command in commands {
                        let effect = protocol::dispatch(command, &mut self.registry, &mut self.link);
                        if let Effect::SamplingChanged(hz) = effect {
                            let period = Config::telemetry_period(hz);
                            if let Err(err) = self.scheduler.set_period(Task::Telemetry, period) {
                                warn!("Telemetry period not changed: {}", err);
                            }
                        }
                    }
                }
                Err(err) => warn!("Serial read failed: {}", err),
            },
            Task::Telemetry => {
                let event = protocol::telemetry(&self.registry);
                self.link.emit(event);
            }
            Task::ReportState => protocol::report_control_states(
                &mut self.registry.channels,
                self.config.regulating_band,
                &mut self.link,
            ),
        }
    }
}
