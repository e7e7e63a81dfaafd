// Serial bridge protocol for the DC motor HAT
//
// A small microcontroller sits between the host and the HAT and forwards
// framed commands onto the HAT's bus address:
// Packet format: [0xFF, 0xFF, Address, Length, Instruction, Params..., Checksum]
// Every command is answered with a status frame: [0xFF, 0xFF, Address, Length, Status, Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::driver::{Direction, MotorDriver};

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    SetSpeed = 0x03,
    Run = 0x04,
}

/// Run commands understood by the HAT's H-bridges
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunCommand {
    Forward = 1,
    Backward = 2,
    Brake = 3,
    Release = 4,
}

impl From<Direction> for RunCommand {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => RunCommand::Forward,
            Direction::Backward => RunCommand::Backward,
            Direction::Release => RunCommand::Release,
        }
    }
}

/// Error types for motor bus communication
#[derive(Debug, thiserror::Error)]
pub enum HatError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from HAT 0x{address:02X}: {reason}")]
    InvalidResponse { address: u8, reason: String },

    #[error("Checksum mismatch from HAT 0x{address:02X}")]
    ChecksumMismatch { address: u8 },

    #[error("HAT 0x{address:02X} rejected command with status 0x{status:02X}")]
    Nack { address: u8, status: u8 },

    #[error("Timeout waiting for response from HAT 0x{address:02X}")]
    Timeout { address: u8 },
}

pub type Result<T> = std::result::Result<T, HatError>;

/// Motor HAT behind a serial bridge
pub struct MotorHat {
    port: Box<dyn SerialPort>,
    address: u8,
}

impl MotorHat {
    /// Open the bridge and check that the HAT answers on `address`
    pub fn connect(port_name: &str, address: u8) -> Result<Self> {
        let mut hat = Self::open(port_name, address)?;
        if !hat.ping()? {
            return Err(HatError::Timeout { address });
        }
        debug!("HAT 0x{:02X} responding on {}", address, port_name);
        Ok(hat)
    }

    /// Open a connection without probing the HAT
    pub fn open(port_name: &str, address: u8) -> Result<Self> {
        Self::open_with_baudrate(port_name, address, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, address: u8, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port, address })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(address: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(address);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read and check a status frame from the bridge
    fn read_status(&mut self) -> Result<()> {
        let address = self.address;
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HatError::Timeout { address }
            } else {
                HatError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(HatError::InvalidResponse {
                address,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut address_length = [0u8; 2];
        self.port.read_exact(&mut address_length)?;
        let mut remaining = vec![0u8; address_length[1] as usize];
        self.port.read_exact(&mut remaining)?;

        Self::parse_status(address, address_length, &remaining)
    }

    /// Validate a status frame body (address, length, then status + checksum)
    fn parse_status(expected: u8, address_length: [u8; 2], remaining: &[u8]) -> Result<()> {
        let [address, length] = address_length;

        if address != expected {
            return Err(HatError::InvalidResponse {
                address: expected,
                reason: format!("Address mismatch: expected 0x{:02X}, got 0x{:02X}", expected, address),
            });
        }
        if remaining.len() < 2 {
            return Err(HatError::InvalidResponse {
                address,
                reason: format!("Status frame too short ({} bytes)", remaining.len()),
            });
        }

        let mut checksum_data = vec![address, length];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        if Self::checksum(&checksum_data) != remaining[remaining.len() - 1] {
            return Err(HatError::ChecksumMismatch { address });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(HatError::Nack { address, status });
        }

        Ok(())
    }

    /// Send one instruction and wait for its acknowledgement
    fn command(&mut self, instruction: Instruction, params: &[u8]) -> Result<()> {
        let packet = Self::build_packet(self.address, instruction, params);
        self.send_packet(&packet)?;
        self.read_status()
    }

    /// Ping the HAT to check if it's connected
    pub fn ping(&mut self) -> Result<bool> {
        match self.command(Instruction::Ping, &[]) {
            Ok(()) => Ok(true),
            Err(HatError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Set the PWM speed (0-255) of one motor channel
    pub fn write_speed(&mut self, motor: u8, speed: u8) -> Result<()> {
        debug!("HAT 0x{:02X}: motor {} speed={}", self.address, motor, speed);
        self.command(Instruction::SetSpeed, &[motor, speed])
    }

    /// Drive one motor channel's H-bridge
    pub fn run(&mut self, motor: u8, command: RunCommand) -> Result<()> {
        debug!("HAT 0x{:02X}: motor {} run={:?}", self.address, motor, command);
        self.command(Instruction::Run, &[motor, command as u8])
    }
}

impl MotorDriver for MotorHat {
    fn set_speed(&mut self, motor: u8, speed: u8) -> Result<()> {
        self.write_speed(motor, speed)
    }

    fn set_direction(&mut self, motor: u8, direction: Direction) -> Result<()> {
        self.run(motor, direction.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Address=0x60, Length=4, Instruction=SET_SPEED, motor=1, speed=100
        let data = [0x60u8, 4, 0x03, 1, 100];
        // ~(96+4+3+1+100) = ~204 = 51
        assert_eq!(MotorHat::checksum(&data), 51);
    }

    #[test]
    fn test_build_run_packet() {
        let packet = MotorHat::build_packet(0x60, Instruction::Run, &[2, RunCommand::Release as u8]);
        // Header (2) + Address (1) + Length (1) + Instruction (1) + Params (2) + Checksum (1)
        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 0x60);
        assert_eq!(packet[3], 4); // instruction + 2 params + checksum
        assert_eq!(packet[4], 0x04);
        assert_eq!(&packet[5..7], &[2, 4]);
        assert_eq!(packet[7], MotorHat::checksum(&packet[2..7]));
    }

    #[test]
    fn test_parse_status_ok_and_nack() {
        let ok_sum = MotorHat::checksum(&[0x60, 2, 0]);
        assert!(MotorHat::parse_status(0x60, [0x60, 2], &[0, ok_sum]).is_ok());

        let nack_sum = MotorHat::checksum(&[0x60, 2, 0x21]);
        assert!(matches!(
            MotorHat::parse_status(0x60, [0x60, 2], &[0x21, nack_sum]),
            Err(HatError::Nack { address: 0x60, status: 0x21 })
        ));
    }

    #[test]
    fn test_parse_status_rejects_corruption() {
        assert!(matches!(
            MotorHat::parse_status(0x60, [0x60, 2], &[0, 0x00]),
            Err(HatError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            MotorHat::parse_status(0x60, [0x61, 2], &[0, 0x00]),
            Err(HatError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_direction_to_run_command() {
        assert_eq!(RunCommand::from(Direction::Forward) as u8, 1);
        assert_eq!(RunCommand::from(Direction::Backward) as u8, 2);
        assert_eq!(RunCommand::from(Direction::Release) as u8, 4);
    }
}
