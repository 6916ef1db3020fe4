//! We use this mocking module in unit tests to emulate the UART to the host.

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Everything the device wrote
    write_buffer: heapless::Vec<u8, 4096>,
    /// Bytes the host has sent, waiting to be read
    read_buffer: heapless::Vec<u8, 512>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate a broken transmitter
    should_error_on_write: bool,
    /// Flag to simulate a transmitter that never accepts bytes
    should_stall_on_write: bool,
    /// Flag to simulate a broken receiver
    should_error_on_read: bool,
    /// Read position from which the receiver fails
    read_error_at: Option<usize>,
    /// Bytes the transmitter still accepts before stalling
    write_budget: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
pub enum MockSerialError {
    /// Simulated buffer overflow
    #[error("Simulated buffer overflow")]
    BufferOverflow,
    /// The port went away
    #[error("The port went away")]
    Disconnected,
    /// Would block - no data available or no room to write
    #[error("Would block")]
    WouldBlock,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::Disconnected => embedded_io::ErrorKind::BrokenPipe,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }
        if self.should_stall_on_write || self.write_budget == Some(0) {
            return Err(MockSerialError::WouldBlock);
        }

        let accepted = match self.write_budget {
            Some(budget) => core::cmp::min(budget, buf.len()),
            None => buf.len(),
        };
        self.write_buffer
            .extend_from_slice(&buf[..accepted])
            .map_err(|_| MockSerialError::BufferOverflow)?;
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= accepted;
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::Disconnected);
        }

        if self
            .read_error_at
            .is_some_and(|at| self.read_position >= at)
        {
            return Err(MockSerialError::Disconnected);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::WouldBlock);
        }

        let end = match self.read_error_at {
            Some(at) => core::cmp::min(at, self.read_buffer.len()),
            None => self.read_buffer.len(),
        };
        let pending = &self.read_buffer[self.read_position..end];
        let bytes_to_read = core::cmp::min(buf.len(), pending.len());
        buf[..bytes_to_read].copy_from_slice(&pending[..bytes_to_read]);

        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read_position < self.read_buffer.len())
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_stall_on_write: false,
            should_error_on_read: false,
            read_error_at: None,
            write_budget: None,
        }
    }

    /// Replace the bytes that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.append_read_data(data)
    }

    /// Queue more bytes after the ones not read yet
    pub fn append_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// The written data as text
    pub fn written_str(&self) -> &str {
        core::str::from_utf8(&self.write_buffer).unwrap()
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether write operations should never make progress
    pub fn set_write_stall(&mut self, should_stall: bool) {
        self.should_stall_on_write = should_stall;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    /// Serve reads normally up to `position` in the read data, then fail
    pub fn set_read_error_after(&mut self, position: usize) {
        self.read_error_at = Some(position);
    }

    /// Accept only this many more bytes, then stall. `None` accepts everything
    pub fn set_write_budget(&mut self, budget: Option<usize>) {
        self.write_budget = budget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, ReadReady, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        mock.write(b"Range 2\n").unwrap();
        mock.write(b"STATE 2 True False False\n").unwrap();
        assert_eq!(mock.written_str(), "Range 2\nSTATE 2 True False False\n");

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn test_read_in_chunks() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"a v\nb 1").unwrap();
        assert!(mock.read_ready().unwrap());

        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"a v\n");
        assert_eq!(mock.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], b"b 1");

        assert!(!mock.read_ready().unwrap());
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::WouldBlock)
        ));
    }

    #[test]
    fn test_append_keeps_unread_bytes() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"a 1").unwrap();
        let mut buffer = [0u8; 2];
        mock.read(&mut buffer).unwrap();
        mock.append_read_data(b".5\n").unwrap();

        let mut buffer = [0u8; 8];
        let n = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"1.5\n");
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert!(matches!(
            mock.write(b"test"),
            Err(MockSerialError::Disconnected)
        ));
        assert!(mock.flush().is_err());
        mock.set_write_error(false);

        mock.set_write_stall(true);
        let err = mock.write(b"test").unwrap_err();
        assert_eq!(err.kind(), embedded_io::ErrorKind::Other);
        assert!(mock.written_data().is_empty());

        mock.set_read_data(b"data").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::Disconnected)
        ));
    }

    #[test]
    fn test_partial_write_then_stall() {
        let mut mock = MockSerial::new();
        mock.set_write_budget(Some(3));
        assert_eq!(mock.write(b"Range 2\n").unwrap(), 3);
        assert!(matches!(
            mock.write(b"nge 2\n"),
            Err(MockSerialError::WouldBlock)
        ));
        assert_eq!(mock.written_str(), "Ran");
    }

    #[test]
    fn test_read_error_after_position() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"a v\nb v\n").unwrap();
        mock.set_read_error_after(4);

        let mut buffer = [0u8; 8];
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::Disconnected)
        ));
    }

    #[test]
    fn test_overflow() {
        let mut mock = MockSerial::new();
        let large = [0u8; 600];
        assert!(matches!(
            mock.set_read_data(&large),
            Err(MockSerialError::BufferOverflow)
        ));
    }
}
