//! A [`Transport`] over a USB serial port.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    time::Duration,
};

use flybrix_wire::frame::{FrameReader, DEBUG_CAPACITY};
use log::{debug, trace};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::{Transport, TransportError};

/// The USB vendor ID of the Teensy boards the firmware runs on.
pub const TEENSY_USB_VID: u16 = 0x16C0;

pub const FLYBRIX_SERIAL_BAUDRATE: u32 = 115200;

/// Lists the serial ports that belong to a Teensy.
pub fn find_ports() -> Result<Vec<SerialPortInfo>, TransportError> {
    let ports = serialport::available_ports()?
        .into_iter()
        .filter(|port| {
            let SerialPortType::UsbPort(info) = &port.port_type else {
                return false;
            };

            if cfg!(target_os = "macos") && port.port_name.starts_with("/dev/tty.") {
                // https://pbxbook.com/other/mac-tty.html
                debug!("Ignoring port named {:?} because it is a call-in device", port.port_name);
                return false;
            }

            info.vid == TEENSY_USB_VID
        })
        .collect();

    Ok(ports)
}

/// Frames arriving on a serial port.
///
/// Reads never block: whatever the port has buffered is split into frames,
/// and [`read_frame`](Transport::read_frame) returns `None` once those run out.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    reader: FrameReader<DEBUG_CAPACITY>,
    frames: VecDeque<Vec<u8>>,
}

impl SerialTransport {
    /// Opens `path` at [`FLYBRIX_SERIAL_BAUDRATE`].
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let port = serialport::new(path, FLYBRIX_SERIAL_BAUDRATE)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(1))
            .open()?;

        Ok(Self::new(port))
    }

    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            reader: FrameReader::new(),
            frames: VecDeque::new(),
        }
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }

        let mut buf = vec![0; available];
        let len = match self.port.read(&mut buf) {
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => 0,
            Err(err) => return Err(err.into()),
        };
        trace!("read {} bytes", len);

        self.frames.extend(self.reader.push(&buf[..len]));
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.frames.is_empty() {
            self.fill()?;
        }
        Ok(self.frames.pop_front())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .field("pending", &self.reader.pending())
            .field("frames", &self.frames.len())
            .finish()
    }
}
