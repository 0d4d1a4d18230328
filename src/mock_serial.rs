//! We use this mocking module in unit tests to emulate an RD60xx on a serial port.
//!
//! [`SimulatedDevice`] holds the register file and acts as the [`Connector`]. Every
//! port it opens answers Modbus RTU requests from that shared register file, so a
//! test can keep a handle to the device and inspect it while the client owns the port.

use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    config::PortConfig,
    frame::{self, EXCEPTION_BIT, READ_HOLDINGS, WRITE_SINGLE, crc16},
    register::Rd60xxRegister,
    transport::{Connector, SerialLink},
};

/// Number of registers in the RD60xx register table.
pub const REGISTER_COUNT: usize = 0x14;

/// Every request the client sends is 8 bytes long.
const REQUEST_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum MockSerialError {
    /// Simulated timeout error
    #[error("Simulated timeout")]
    Timeout,
    /// Port could not be opened
    #[error("No such port")]
    NotFound,
    /// Generic simulated error for testing
    #[error("Simulated error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::NotFound => embedded_io::ErrorKind::NotFound,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

/// How the simulated device misbehaves.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// Never answers, reads time out.
    Silent,
    /// Never answers, reads return zero bytes instead of timing out.
    Stall,
    /// Flips a bit of the response CRC.
    CorruptCrc,
    /// Drops the response CRC.
    Truncate,
    /// Answers as unit id + 1.
    WrongUnit,
    /// Sends the first response byte after the given delay, the rest never arrives.
    LateByte(Duration),
    /// Answers with the given Modbus exception code.
    Exception(u8),
    /// Reads fail with an I/O error.
    ReadError,
    /// Writes fail with an I/O error.
    WriteError,
}

#[derive(Debug)]
struct Device {
    unit_id: u8,
    registers: [u16; REGISTER_COUNT],
    fault: Fault,
    fail_open: bool,
    open_count: usize,
    requests: Vec<Vec<u8>>,
}

/// Handle to a simulated PSU. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice(Rc<RefCell<Device>>);

impl SimulatedDevice {
    /// Create a device answering to `unit_id` with all registers zero.
    pub fn new(unit_id: u8) -> Self {
        Self(Rc::new(RefCell::new(Device {
            unit_id,
            registers: [0; REGISTER_COUNT],
            fault: Fault::None,
            fail_open: false,
            open_count: 0,
            requests: Vec::new(),
        })))
    }

    pub fn register(&self, register: Rd60xxRegister) -> u16 {
        self.0.borrow().registers[register as usize]
    }

    pub fn set_register(&self, register: Rd60xxRegister, value: u16) {
        self.0.borrow_mut().registers[register as usize] = value;
    }

    pub fn set_fault(&self, fault: Fault) {
        self.0.borrow_mut().fault = fault;
    }

    /// Make the next [`Connector::open`] calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.0.borrow_mut().fail_open = fail;
    }

    pub fn open_count(&self) -> usize {
        self.0.borrow().open_count
    }

    /// All complete request frames received so far, in order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.0.borrow().requests.clone()
    }

    fn fault(&self) -> Fault {
        self.0.borrow().fault
    }

    /// Answer one request frame. An empty answer means the device stays silent.
    fn answer(&self, request: &[u8]) -> Vec<u8> {
        let mut device = self.0.borrow_mut();
        device.requests.push(request.to_vec());

        let (body, crc) = request.split_at(request.len() - 2);
        if crc16(body).to_le_bytes() != [crc[0], crc[1]] || body[0] != device.unit_id {
            // A real device ignores frames it cannot trust or that are not for it.
            return Vec::new();
        }

        let function = body[1];
        let address = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let value = u16::from_be_bytes([body[4], body[5]]);

        let mut response = match (device.fault, function) {
            (Fault::Silent | Fault::Stall, _) => return Vec::new(),
            (Fault::Exception(code), _) => vec![device.unit_id, function | EXCEPTION_BIT, code],
            (_, READ_HOLDINGS) => {
                let count = usize::from(value);
                if count == 0 || address + count > REGISTER_COUNT {
                    vec![device.unit_id, function | EXCEPTION_BIT, 0x02]
                } else {
                    let mut response = vec![device.unit_id, function, (count * 2) as u8];
                    for register in &device.registers[address..address + count] {
                        response.extend_from_slice(&register.to_be_bytes());
                    }
                    response
                }
            }
            (_, WRITE_SINGLE) => {
                if address >= REGISTER_COUNT {
                    vec![device.unit_id, function | EXCEPTION_BIT, 0x02]
                } else {
                    device.registers[address] = value;
                    body.to_vec()
                }
            }
            _ => vec![device.unit_id, function | EXCEPTION_BIT, 0x01],
        };

        if device.fault == Fault::WrongUnit {
            response[0] = device.unit_id.wrapping_add(1);
        }
        let mut response = frame::with_crc(&response);
        match device.fault {
            Fault::CorruptCrc => {
                if let Some(last) = response.last_mut() {
                    *last ^= 0x01;
                }
            }
            Fault::Truncate => response.truncate(response.len() - 2),
            Fault::LateByte(_) => response.truncate(1),
            _ => {}
        }
        response
    }
}

impl Connector for SimulatedDevice {
    type Port = MockSerial;

    fn open(&mut self, config: &PortConfig) -> Result<MockSerial, MockSerialError> {
        if self.0.borrow().fail_open {
            return Err(MockSerialError::NotFound);
        }
        self.0.borrow_mut().open_count += 1;
        let mut port = MockSerial::detached(self);
        port.read_timeout = config.timeout;
        Ok(port)
    }
}

/// Our mock type used to emulate the serial port the PSU is attached to.
pub struct MockSerial {
    device: SimulatedDevice,
    /// Bytes written but not yet forming a complete request.
    request: Vec<u8>,
    /// Response bytes waiting to be read.
    response: VecDeque<u8>,
    /// When the queued response bytes may be read.
    ready_at: Option<Instant>,
    /// How long a read blocks waiting for data, like a real serial port.
    read_timeout: Duration,
}

impl MockSerial {
    /// A port talking to `device` without going through [`Connector::open`].
    pub fn detached(device: &SimulatedDevice) -> Self {
        Self {
            device: device.clone(),
            request: Vec::new(),
            response: VecDeque::new(),
            ready_at: None,
            read_timeout: Duration::ZERO,
        }
    }

    /// Bytes received but not read yet.
    pub fn pending(&self) -> usize {
        self.response.len()
    }

    /// Append raw bytes to what the next reads return.
    pub fn queue_response(&mut self, data: &[u8]) {
        self.response.extend(data);
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.device.fault() == Fault::WriteError {
            return Err(MockSerialError::SimulatedError);
        }
        self.request.extend_from_slice(buf);
        while self.request.len() >= REQUEST_LEN {
            let frame: Vec<u8> = self.request.drain(..REQUEST_LEN).collect();
            let answer = self.device.answer(&frame);
            if let Fault::LateByte(delay) = self.device.fault() {
                self.ready_at = Some(Instant::now() + delay);
            }
            self.response.extend(answer);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.device.fault() == Fault::WriteError {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.device.fault() {
            Fault::ReadError => return Err(MockSerialError::SimulatedError),
            Fault::Stall if self.response.is_empty() => return Ok(0),
            _ => {}
        }
        let now = Instant::now();
        let ready_at = self.ready_at.unwrap_or(now);
        if self.response.is_empty() || ready_at > now + self.read_timeout {
            std::thread::sleep(self.read_timeout);
            return Err(MockSerialError::Timeout);
        }
        std::thread::sleep(ready_at.saturating_duration_since(now));
        self.ready_at = None;

        let bytes_to_read = buf.len().min(self.response.len());
        for (slot, byte) in buf.iter_mut().zip(self.response.drain(..bytes_to_read)) {
            *slot = byte;
        }
        Ok(bytes_to_read)
    }
}

impl SerialLink for MockSerial {
    fn clear_input(&mut self) -> Result<(), MockSerialError> {
        self.response.clear();
        self.ready_at = None;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), MockSerialError> {
        self.read_timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    fn request(body: &[u8]) -> Vec<u8> {
        frame::with_crc(body)
    }

    #[test]
    fn test_read_request_answered() {
        let device = SimulatedDevice::new(0x01);
        device.set_register(Rd60xxRegister::VSet, 12_000);
        let mut port = MockSerial::detached(&device);

        port.write_all(&request(&[0x01, 0x03, 0x00, 0x08, 0x00, 0x01])).unwrap();

        let mut buffer = [0u8; 16];
        let read = port.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..read], &[0x01, 0x03, 0x02, 0x2E, 0xE0, 0xA4, 0x6C]);
    }

    #[test]
    fn test_write_request_echoed() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        let frame = request(&[0x01, 0x06, 0x00, 0x12, 0x00, 0x01]);

        port.write_all(&frame).unwrap();

        let mut buffer = [0u8; 16];
        let read = port.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..read], frame.as_slice());
        assert_eq!(device.register(Rd60xxRegister::OnOff), 1);
    }

    #[test]
    fn test_request_split_over_writes() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        let frame = request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);

        port.write_all(&frame[..3]).unwrap();
        assert!(device.requests().is_empty());
        port.write_all(&frame[3..]).unwrap();
        assert_eq!(device.requests(), vec![frame]);
    }

    #[test]
    fn test_read_partial_data() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        port.queue_response(b"Hello World");

        let mut buffer1 = [0u8; 5];
        let mut buffer2 = [0u8; 6];
        assert_eq!(port.read(&mut buffer1).unwrap(), 5);
        assert_eq!(port.read(&mut buffer2).unwrap(), 6);
        assert_eq!(&buffer1, b"Hello");
        assert_eq!(&buffer2, b" World");
    }

    #[test]
    fn test_read_timeout_when_no_data() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        let mut buffer = [0u8; 10];

        let result = port.read(&mut buffer);
        assert_eq!(result, Err(MockSerialError::Timeout));
    }

    #[test]
    fn test_read_blocks_for_read_timeout() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        port.set_read_timeout(Duration::from_millis(20)).unwrap();

        let started = Instant::now();
        let mut buffer = [0u8; 10];
        assert_eq!(port.read(&mut buffer), Err(MockSerialError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_late_byte_arrives_after_delay() {
        let device = SimulatedDevice::new(0x01);
        device.set_fault(Fault::LateByte(Duration::from_millis(30)));
        let mut port = MockSerial::detached(&device);
        port.set_read_timeout(Duration::from_millis(10)).unwrap();
        port.write_all(&request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01])).unwrap();

        let mut buffer = [0u8; 10];
        assert_eq!(port.read(&mut buffer), Err(MockSerialError::Timeout));
        port.set_read_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(port.read(&mut buffer), Ok(1));
        assert_eq!(buffer[0], 0x01);
    }

    #[test]
    fn test_clear_input_discards_pending() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        port.queue_response(b"stale");
        assert_eq!(port.pending(), 5);

        port.clear_input().unwrap();
        assert_eq!(port.pending(), 0);
    }

    #[test]
    fn test_other_unit_and_bad_crc_ignored() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);

        port.write_all(&request(&[0x02, 0x03, 0x00, 0x08, 0x00, 0x01])).unwrap();
        let mut bad = request(&[0x01, 0x03, 0x00, 0x08, 0x00, 0x01]);
        bad[7] ^= 0xFF;
        port.write_all(&bad).unwrap();

        let mut buffer = [0u8; 10];
        assert!(port.read(&mut buffer).is_err());
        assert_eq!(device.requests().len(), 2);
    }

    #[test]
    fn test_out_of_table_read_is_exception() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);
        port.write_all(&request(&[0x01, 0x03, 0x00, 0x13, 0x00, 0x02])).unwrap();

        let mut buffer = [0u8; 10];
        let read = port.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..read], &[0x01, 0x83, 0x02, 0xC0, 0xF1]);
    }

    #[test]
    fn test_error_simulation() {
        let device = SimulatedDevice::new(0x01);
        let mut port = MockSerial::detached(&device);

        device.set_fault(Fault::WriteError);
        assert_eq!(port.write(b"test"), Err(MockSerialError::SimulatedError));
        assert_eq!(port.flush(), Err(MockSerialError::SimulatedError));

        device.set_fault(Fault::ReadError);
        port.queue_response(b"data");
        let mut buffer = [0u8; 10];
        assert_eq!(port.read(&mut buffer), Err(MockSerialError::SimulatedError));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut));
        assert!(matches!(MockSerialError::NotFound.kind(), embedded_io::ErrorKind::NotFound));
        assert!(matches!(MockSerialError::SimulatedError.kind(), embedded_io::ErrorKind::Other));
    }

    #[test]
    fn test_connector_counts_opens() {
        let mut device = SimulatedDevice::new(0x01);
        let config = PortConfig::default();
        assert!(device.open(&config).is_ok());
        device.set_fail_open(true);
        assert!(matches!(device.open(&config), Err(MockSerialError::NotFound)));
        assert_eq!(device.open_count(), 1);
    }
}
