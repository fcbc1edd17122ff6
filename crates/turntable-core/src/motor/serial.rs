use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Close the relay (motor on).
pub const RELAY_ON: u8 = b'1';
/// Open the relay (motor off).
pub const RELAY_OFF: u8 = b'0';
/// Acknowledgement line some firmware prints after each command.
pub const ACK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialEndpoint {
    pub port: String,
    pub baud_rate: u32,
}

// ---------------------------------------------------------------------------
// Transport traits
// ---------------------------------------------------------------------------

/// An open connection to the relay microcontroller.
pub trait SerialChannel: Send {
    fn write_command(&mut self, command: u8) -> io::Result<()>;

    /// Read one acknowledgement line. `Ok(None)` when nothing arrives before
    /// the channel's read timeout.
    fn read_ack(&mut self) -> io::Result<Option<String>>;
}

/// Opens fresh channels. Every (re)connect goes through here so no handle
/// survives a fault.
pub trait SerialOpener: Send + Sync {
    fn open(&self, endpoint: &SerialEndpoint) -> io::Result<Box<dyn SerialChannel>>;
}

// ---------------------------------------------------------------------------
// SystemSerial
// ---------------------------------------------------------------------------

/// Real serial ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SystemSerial {
    response_timeout: Duration,
}

impl SystemSerial {
    pub fn new(response_timeout: Duration) -> Self {
        Self { response_timeout }
    }
}

impl SerialOpener for SystemSerial {
    fn open(&self, endpoint: &SerialEndpoint) -> io::Result<Box<dyn SerialChannel>> {
        let port = serialport::new(endpoint.port.as_str(), endpoint.baud_rate)
            .timeout(self.response_timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(PortChannel { port }))
    }
}

struct PortChannel {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialChannel for PortChannel {
    fn write_command(&mut self, command: u8) -> io::Result<()> {
        self.port.write_all(&[command])?;
        self.port.flush()
    }

    fn read_ack(&mut self) -> io::Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
    }
}

// ---------------------------------------------------------------------------
// SimulatedSerial
// ---------------------------------------------------------------------------

/// In-process stand-in for the microcontroller: accepts the relay commands
/// and answers each with `OK`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSerial;

impl SerialOpener for SimulatedSerial {
    fn open(&self, endpoint: &SerialEndpoint) -> io::Result<Box<dyn SerialChannel>> {
        tracing::info!(port = %endpoint.port, "using simulated relay controller");
        Ok(Box::new(SimulatedChannel {
            relay_closed: false,
            pending_ack: false,
        }))
    }
}

struct SimulatedChannel {
    relay_closed: bool,
    pending_ack: bool,
}

impl SerialChannel for SimulatedChannel {
    fn write_command(&mut self, command: u8) -> io::Result<()> {
        match command {
            RELAY_ON => self.relay_closed = true,
            RELAY_OFF => self.relay_closed = false,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown relay command {other:#04x}"),
                ))
            }
        }
        tracing::debug!(relay_closed = self.relay_closed, "simulated relay");
        self.pending_ack = true;
        Ok(())
    }

    fn read_ack(&mut self) -> io::Result<Option<String>> {
        if std::mem::take(&mut self.pending_ack) {
            Ok(Some(ACK.to_string()))
        } else {
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Port discovery
// ---------------------------------------------------------------------------

/// USB vendor ids of boards commonly used as the relay controller
/// (Arduino, Arduino.org, CH340 clones, FTDI).
const MICROCONTROLLER_VIDS: [u16; 4] = [0x2341, 0x2a03, 0x1a86, 0x0403];
const MICROCONTROLLER_NAMES: [&str; 7] =
    ["arduino", "uno", "mega", "leonardo", "nano", "micro", "due"];

#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub port: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub likely_microcontroller: bool,
}

/// Enumerate serial ports, flagging the ones that look like a relay board.
pub fn list_ports() -> io::Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(io::Error::from)?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let likely = MICROCONTROLLER_VIDS.contains(&usb.vid)
                    || looks_like_microcontroller(usb.product.as_deref());
                PortInfo {
                    port: p.port_name,
                    description: usb.product,
                    manufacturer: usb.manufacturer,
                    likely_microcontroller: likely,
                }
            }
            _ => PortInfo {
                port: p.port_name,
                description: None,
                manufacturer: None,
                likely_microcontroller: false,
            },
        })
        .collect())
}

fn looks_like_microcontroller(description: Option<&str>) -> bool {
    let Some(desc) = description else {
        return false;
    };
    let desc = desc.to_lowercase();
    MICROCONTROLLER_NAMES.iter().any(|n| desc.contains(n))
}
