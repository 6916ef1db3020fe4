//! The channel registry, the single in-memory record of every output channel.
//!
//! Each channel is split into one record per writer. A record's fields are private to
//! the module of the component that owns it, so only that component can change them.

use fugit::TimerInstantU64;

use crate::{
    config::Config,
    panel::{PanelState, SelectionState},
    protocol::{CommandState, ReportState, Settings},
    regulator::RegulationState,
    supervisor::SafetyState,
    types::{CHANNEL_COUNT, ChannelId},
};

/// Millisecond device clock.
pub type Instant = TimerInstantU64<1000>;

/// Everything known about one output channel.
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    /// Written by the protocol engine.
    pub command: CommandState,
    /// Written by the panel watcher.
    pub panel: PanelState,
    /// Written by the regulator.
    pub regulation: RegulationState,
    /// Written by the safety supervisor.
    pub safety: SafetyState,
    /// Written by the state reporters.
    pub report: ReportState,
}

impl Channel {
    /// A channel in its power-up state: voltage mode at 0 V, zero output, relay
    /// engaged, not connected.
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            command: CommandState::default(),
            panel: PanelState::default(),
            regulation: RegulationState::default(),
            safety: SafetyState::default(),
            report: ReportState::default(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    /// Indexed by [`ChannelId::index`].
    pub channels: [Channel; CHANNEL_COUNT],
    pub settings: Settings,
    pub selection: SelectionState,
    now: Instant,
}

impl Registry {
    pub fn new(config: &Config, now: Instant) -> Self {
        Self {
            channels: ChannelId::ALL.map(Channel::new),
            settings: Settings::new(config.sampling_hz),
            selection: SelectionState::default(),
            now,
        }
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.index()]
    }

    /// Device time of the task being run.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Time only moves forward.
    pub(crate) fn advance(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }
}
