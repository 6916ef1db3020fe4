//! We use this mocking module in unit tests to emulate the board's pins, PWM outputs,
//! I2C bus and power monitors.
//!
//! Every mock is a cheap handle around shared state: keep a clone in the test to drive
//! inputs and inspect outputs after handing the other clone to the code under test.

use std::{cell::Cell, cell::RefCell, rc::Rc};

use embedded_hal::{digital, i2c, pwm};

use crate::{error::SensorError, sensor::PowerMonitor, types::ChannelId};

/// The one error every mock peripheral returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockHalError {
    /// Generic simulated failure.
    SimulatedError,
    /// Nobody answered at this I2C address.
    NoAcknowledge,
}

impl digital::Error for MockHalError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for MockHalError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl i2c::Error for MockHalError {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            MockHalError::SimulatedError => i2c::ErrorKind::Other,
            MockHalError::NoAcknowledge => {
                i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address)
            }
        }
    }
}

/// A GPIO usable as input or output.
#[derive(Clone)]
pub struct MockPin {
    high: Rc<Cell<bool>>,
    fail: Rc<Cell<bool>>,
}

impl MockPin {
    pub fn new(high: bool) -> Self {
        Self {
            high: Rc::new(Cell::new(high)),
            fail: Rc::new(Cell::new(false)),
        }
    }

    /// Set the level seen by readers.
    pub fn drive(&self, high: bool) {
        self.high.set(high);
    }

    /// Current level, `true` meaning high.
    pub fn level(&self) -> bool {
        self.high.get()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    fn check(&self) -> Result<(), MockHalError> {
        if self.fail.get() {
            Err(MockHalError::SimulatedError)
        } else {
            Ok(())
        }
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockHalError;
}

impl digital::InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        Ok(self.high.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        Ok(!self.high.get())
    }
}

impl digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.high.set(true);
        Ok(())
    }
}

/// A 16-bit PWM output. Starts at full duty.
#[derive(Clone)]
pub struct MockPwm {
    duty: Rc<Cell<u16>>,
    writes: Rc<Cell<usize>>,
    fail: Rc<Cell<bool>>,
}

impl MockPwm {
    pub fn new() -> Self {
        Self {
            duty: Rc::new(Cell::new(u16::MAX)),
            writes: Rc::new(Cell::new(0)),
            fail: Rc::new(Cell::new(false)),
        }
    }

    pub fn duty(&self) -> u16 {
        self.duty.get()
    }

    /// Number of successful duty updates.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl pwm::ErrorType for MockPwm {
    type Error = MockHalError;
}

impl pwm::SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(MockHalError::SimulatedError);
        }
        self.duty.set(duty);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// An I2C bus with a single device exposing 16-bit big-endian registers.
#[derive(Clone)]
pub struct MockI2c {
    address: u8,
    registers: Rc<RefCell<[u16; 256]>>,
    pointer: Rc<Cell<u8>>,
    fail: Rc<Cell<bool>>,
}

impl MockI2c {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: Rc::new(RefCell::new([0; 256])),
            pointer: Rc::new(Cell::new(0)),
            fail: Rc::new(Cell::new(false)),
        }
    }

    pub fn set_register(&self, register: u8, value: u16) {
        self.registers.borrow_mut()[register as usize] = value;
    }

    pub fn register(&self, register: u8) -> u16 {
        self.registers.borrow()[register as usize]
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl i2c::ErrorType for MockI2c {
    type Error = MockHalError;
}

impl i2c::I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail.get() {
            return Err(MockHalError::SimulatedError);
        }
        if address != self.address {
            return Err(MockHalError::NoAcknowledge);
        }

        for operation in operations {
            match operation {
                i2c::Operation::Write(bytes) => {
                    if let Some((&pointer, data)) = bytes.split_first() {
                        self.pointer.set(pointer);
                        if let [high, low] = *data {
                            self.set_register(pointer, u16::from_be_bytes([high, low]));
                        }
                    }
                }
                i2c::Operation::Read(buffer) => {
                    let value = self.register(self.pointer.get()).to_be_bytes();
                    for (byte, value) in buffer.iter_mut().zip(value) {
                        *byte = value;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MonitorState {
    voltage: [f64; 3],
    current: [f64; 3],
    reads: usize,
    fail: bool,
}

/// A power monitor returning scripted values.
#[derive(Clone, Default)]
pub struct MockMonitor {
    state: Rc<RefCell<MonitorState>>,
}

impl MockMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a channel: bus volts and amps at the reference shunt.
    pub fn set(&self, channel: ChannelId, volts: f64, amps: f64) {
        let mut state = self.state.borrow_mut();
        state.voltage[channel.index()] = volts;
        state.current[channel.index()] = amps;
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.borrow_mut().fail = fail;
    }

    /// Number of measurement calls made so far.
    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }
}

impl PowerMonitor for MockMonitor {
    fn bus_voltage(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        let mut state = self.state.borrow_mut();
        if state.fail {
            return Err(SensorError::Bus(i2c::ErrorKind::Other));
        }
        state.reads += 1;
        Ok(state.voltage[channel.index()])
    }

    fn current(&mut self, channel: ChannelId) -> Result<f64, SensorError> {
        let mut state = self.state.borrow_mut();
        if state.fail {
            return Err(SensorError::Bus(i2c::ErrorKind::Other));
        }
        state.reads += 1;
        Ok(state.current[channel.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{InputPin, OutputPin};
    use embedded_hal::i2c::I2c;
    use embedded_hal::pwm::SetDutyCycle;

    #[test]
    fn pin_handles_share_level() {
        let pin = MockPin::new(true);
        let mut output = pin.clone();
        output.set_low().unwrap();
        assert!(!pin.level());

        let mut input = pin.clone();
        pin.drive(true);
        assert!(input.is_high().unwrap());
        pin.set_fail(true);
        assert_eq!(input.is_low(), Err(MockHalError::SimulatedError));
    }

    #[test]
    fn pwm_fraction_is_exact() {
        let pwm = MockPwm::new();
        let mut output = pwm.clone();
        output.set_duty_cycle_fraction(12345, u16::MAX).unwrap();
        assert_eq!(pwm.duty(), 12345);
        assert_eq!(pwm.writes(), 1);
    }

    #[test]
    fn i2c_register_access() {
        let bus = MockI2c::new(0x40);
        let mut device = bus.clone();
        device.write(0x40, &[0x02, 0x12, 0x34]).unwrap();
        assert_eq!(bus.register(0x02), 0x1234);

        let mut buffer = [0u8; 2];
        device.write_read(0x40, &[0x02], &mut buffer).unwrap();
        assert_eq!(buffer, [0x12, 0x34]);
        assert_eq!(
            device.write(0x41, &[0x00]),
            Err(MockHalError::NoAcknowledge)
        );
    }
}
