use core::fmt::Write as _;

use embedded_io::{Error as _, ErrorKind, Read, ReadReady, Write};
use log::{debug, warn};

use crate::{
    error::{Error, Result},
    protocol::{Command, Event, EventSink},
};

/// Bytes pulled from the interface per read call.
const READ_CHUNK: usize = 8;
/// Read calls allowed per [`Link::poll`].
const MAX_READS: usize = 16;
/// Write calls allowed per line before it is dropped.
const WRITE_ATTEMPTS: usize = 8;
/// Longest line the device emits.
const LINE_OUT: usize = 256;

/// Commands parsed during one [`Link::poll`].
pub const MAX_COMMANDS: usize = 16;

pub type Commands = heapless::Vec<Command, MAX_COMMANDS>;

/// Line-oriented link to the host over any interface implementing [embedded_io::Read],
/// [embedded_io::ReadReady] and [embedded_io::Write].
///
/// `L` is the longest inbound line accepted.
pub struct Link<S: Read + ReadReady + Write, const L: usize = 128> {
    interface: S,
    line: heapless::Vec<u8, L>,
    /// The line being received did not fit and is being skipped.
    overflowed: bool,
    /// The last line sent was cut short and the host has not seen its terminator.
    mid_line: bool,
}

impl<S: Read + ReadReady + Write, const L: usize> Link<S, L> {
    pub fn new(interface: S) -> Self {
        Self {
            interface,
            line: heapless::Vec::new(),
            overflowed: false,
            mid_line: false,
        }
    }

    /// Consume the bytes already waiting and return the commands they complete.
    ///
    /// Never waits for data. Partial lines are kept for the next call. A read error
    /// after some commands were completed is logged and those commands returned.
    pub fn poll(&mut self) -> Result<Commands, S::Error> {
        let mut commands = Commands::new();
        let mut chunk = [0u8; READ_CHUNK];

        for _ in 0..MAX_READS {
            // Stop while a full chunk of short lines would still fit.
            if commands.capacity() - commands.len() < READ_CHUNK / 2 {
                break;
            }
            match self.interface.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if would_block(e.kind()) => break,
                Err(e) => return interrupted(commands, e),
            }
            let bytes_read = match self.interface.read(&mut chunk) {
                Ok(0) => break,
                Ok(bytes_read) => bytes_read,
                Err(e) if would_block(e.kind()) => break,
                Err(e) => return interrupted(commands, e),
            };
            for &byte in &chunk[..bytes_read] {
                self.accept(byte, &mut commands);
            }
        }

        Ok(commands)
    }

    /// Write one event as a `\n` terminated line.
    ///
    /// If the previous line was cut short it is terminated first, so the host drops the
    /// fragment instead of reading it joined to this line.
    pub fn send(&mut self, event: &Event) -> Result<(), S::Error> {
        let mut line: heapless::String<LINE_OUT> = heapless::String::new();
        if self.mid_line {
            line.push('\n').map_err(|_| Error::BufferError)?;
        }
        writeln!(line, "{}", event).map_err(|_| Error::BufferError)?;

        let mut pending = line.as_bytes();
        let mut attempts = 0;
        while !pending.is_empty() {
            if attempts == WRITE_ATTEMPTS {
                return Err(Error::Timeout);
            }
            attempts += 1;
            match self.interface.write(pending) {
                Ok(0) => {}
                Ok(written) => {
                    self.mid_line = pending[written - 1] != b'\n';
                    pending = &pending[written..];
                }
                Err(e) if would_block(e.kind()) => {}
                Err(e) => return Err(Error::SerialError(e)),
            }
        }
        Ok(())
    }

    pub fn interface(&mut self) -> &mut S {
        &mut self.interface
    }

    fn accept(&mut self, byte: u8, commands: &mut Commands) {
        if byte != b'\n' {
            if self.line.push(byte).is_err() {
                if !self.overflowed {
                    warn!("Inbound line longer than {} bytes, discarding", L);
                }
                self.overflowed = true;
                self.line.clear();
            }
            return;
        }

        if self.overflowed {
            self.overflowed = false;
            self.line.clear();
            return;
        }

        match core::str::from_utf8(&self.line) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    debug!("Received {:?}", text);
                    if commands.push(Command::parse(text)).is_err() {
                        warn!("Too many commands in one poll, dropping {:?}", text);
                    }
                }
            }
            Err(_) => warn!("Inbound line is not UTF-8, discarding"),
        }
        self.line.clear();
    }
}

impl<S: Read + ReadReady + Write, const L: usize> EventSink for Link<S, L> {
    fn emit(&mut self, event: Event) {
        if let Err(err) = self.send(&event) {
            warn!("Dropped line \"{}\": {}", event, err);
        }
    }
}

/// Hand back what was parsed before a read error, or the error if nothing was.
fn interrupted<E: embedded_io::Error>(commands: Commands, err: E) -> Result<Commands, E> {
    if commands.is_empty() {
        return Err(Error::SerialError(err));
    }
    warn!("Serial read failed after {} commands: {:?}", commands.len(), err.kind());
    Ok(commands)
}

/// Error kinds that mean "nothing to do right now" rather than a broken link.
fn would_block(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Other | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}
