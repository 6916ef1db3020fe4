//! Front panel: the five-position range selector and the three output-connect switches.

use embedded_hal::digital::{Error as _, InputPin};
use log::{error, info, warn};
use modular_bitfield::prelude::*;

use crate::{
    channel::Channel,
    protocol::{Event, EventSink},
    types::{CHANNEL_COUNT, Range, RANGE_COUNT},
};

/// Panel-derived state of one channel. Only the panel watcher writes this.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanelState {
    range: Option<Range>,
    shunt_ohms: Option<f64>,
    connected: bool,
}

impl PanelState {
    pub fn range(&self) -> Option<Range> {
        self.range
    }

    /// Shunt in circuit, `None` while the selector reads invalid.
    pub fn shunt_ohms(&self) -> Option<f64> {
        self.shunt_ohms
    }

    /// Push-pull output switched to the load.
    pub fn connected(&self) -> bool {
        self.connected
    }

    #[cfg(test)]
    pub(crate) fn fixed(range: Option<Range>, connected: bool) -> Self {
        Self {
            range,
            shunt_ohms: range.map(Range::shunt_ohms),
            connected,
        }
    }
}

/// Range last selected on the panel, shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionState {
    range: Option<Range>,
}

impl SelectionState {
    pub fn range(&self) -> Option<Range> {
        self.range
    }
}

/// Levels of the range selector lines, one bit per position. A line is pulled up and
/// reads low when its position is selected.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorLines {
    pub line0: bool,
    pub line1: bool,
    pub line2: bool,
    pub line3: bool,
    pub line4: bool,
    #[skip]
    __: B3,
}

impl SelectorLines {
    /// Build from pin levels, `true` meaning high.
    pub fn from_levels(levels: [bool; RANGE_COUNT]) -> Self {
        SelectorLines::new()
            .with_line0(levels[0])
            .with_line1(levels[1])
            .with_line2(levels[2])
            .with_line3(levels[3])
            .with_line4(levels[4])
    }

    /// The selected range, if exactly one line is low.
    pub fn selected(&self) -> Option<Range> {
        let mask = (1u8 << RANGE_COUNT) - 1;
        let low = !self.into_bytes()[0] & mask;
        if low.count_ones() != 1 {
            return None;
        }
        Range::try_from(low.trailing_zeros() as usize).ok()
    }
}

/// Polls the panel and propagates changes to every channel.
pub struct PanelWatcher<S: InputPin, C: InputPin> {
    selectors: [S; RANGE_COUNT],
    /// Connect switches, high when the output is connected.
    switches: [C; CHANNEL_COUNT],
    invalid: bool,
}

impl<S: InputPin, C: InputPin> PanelWatcher<S, C> {
    pub fn new(selectors: [S; RANGE_COUNT], switches: [C; CHANNEL_COUNT]) -> Self {
        Self {
            selectors,
            switches,
            invalid: false,
        }
    }

    /// Read the panel once, update the channels and emit what changed.
    pub fn poll(
        &mut self,
        selection: &mut SelectionState,
        channels: &mut [Channel; CHANNEL_COUNT],
        sink: &mut impl EventSink,
    ) {
        match self.read_selector() {
            Some(range) => {
                self.invalid = false;
                let shunt_unset = channels.iter().any(|c| c.panel.shunt_ohms.is_none());
                if selection.range != Some(range) || shunt_unset {
                    for channel in channels.iter_mut() {
                        channel.panel.range = Some(range);
                        channel.panel.shunt_ohms = Some(range.shunt_ohms());
                    }
                    selection.range = Some(range);
                    info!("Range {} selected, {} ohm shunt", range, range.shunt_ohms());
                    sink.emit(Event::Range(range));
                }
            }
            None => {
                if !self.invalid {
                    warn!("Invalid range selection, current unavailable");
                    self.invalid = true;
                }
                for channel in channels.iter_mut() {
                    channel.panel.shunt_ohms = None;
                }
            }
        }

        for (channel, switch) in channels.iter_mut().zip(self.switches.iter_mut()) {
            match switch.is_high() {
                Ok(connected) if connected != channel.panel.connected => {
                    channel.panel.connected = connected;
                    info!("Channel {}: output connected {}", channel.id(), connected);
                    sink.emit(Event::Connection {
                        channel: channel.id(),
                        connected,
                    });
                }
                Ok(_) => {}
                Err(err) => error!(
                    "Channel {}: connect switch read failed: {:?}",
                    channel.id(),
                    err.kind()
                ),
            }
        }
    }

    fn read_selector(&mut self) -> Option<Range> {
        let mut levels = [true; RANGE_COUNT];
        for (level, pin) in levels.iter_mut().zip(self.selectors.iter_mut()) {
            match pin.is_high() {
                Ok(high) => *level = high,
                Err(err) => {
                    error!("Range selector read failed: {:?}", err.kind());
                    return None;
                }
            }
        }
        SelectorLines::from_levels(levels).selected()
    }
}
