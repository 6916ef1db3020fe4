use std::env;

use embedded_io::{Read, Write};
use inquire::Select;
use serialport::SerialPort;
use tri_source::protocol::Command;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 115200;
const SERIAL_TIMEOUT_MS: u64 = 100;
// Telemetry at 10 Hz, so a second of listening shows a handful of lines.
const LISTEN_MS: u64 = 1000;

const SESSION: &[&str] = &[
    "set sampling 10",
    "a v",
    "a 3.5",
    "a 1w",
    "b i",
    "b 20",
    "c nc",
    "USER PANEL STATE",
];

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

/// Print every complete line received until `duration` has passed.
fn listen(port: &mut PortWrapper, duration: std::time::Duration) {
    let start = std::time::Instant::now();
    let mut pending = Vec::new();
    let mut buffer = [0u8; 64];

    while start.elapsed() < duration {
        match port.read(&mut buffer) {
            Ok(n) => pending.extend_from_slice(&buffer[..n]),
            Err(err) if embedded_io::Error::kind(&err) == embedded_io::ErrorKind::TimedOut => {}
            Err(err) => {
                eprintln!("Read failed: {}", err);
                return;
            }
        }

        while let Some(end) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            println!("<- {}", String::from_utf8_lossy(&line).trim_end());
        }
    }
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let mut port = PortWrapper(port);

    for line in SESSION {
        // The device ignores lines it cannot parse, so catch typos here.
        if let Command::Unrecognized(reason) = Command::parse(line) {
            eprintln!("Not sending {:?}: {:?}", line, reason);
            continue;
        }

        println!("-> {}", line);
        port.write_all(line.as_bytes()).expect("Failed to write");
        port.write_all(b"\n").expect("Failed to write");
        port.flush().expect("Failed to flush");

        listen(&mut port, std::time::Duration::from_millis(SERIAL_TIMEOUT_MS));
    }

    println!("\n--- Telemetry ---");
    listen(&mut port, std::time::Duration::from_millis(LISTEN_MS));
}
