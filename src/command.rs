use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::packet::Packet;
use crate::{MAX_WIRE_PAYLOAD, PACKET_WIRE_SIZE};

/// Command id echoed in a response that failed header, length or checksum
/// validation and never reached dispatch.
pub const PROTOCOL_ERROR_ID: u8 = 0xFF;

/// Firmware version reported by [`Command::Version`]: major, minor, patch.
pub const DEVICE_VERSION: [u8; 3] = [1, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = CommandError, constructor = CommandError::Unknown))]
#[repr(u8)]
pub enum CommandKind {
    Read = 0x01,
    Write = 0x02,
    Status = 0x03,
    Reset = 0x04,
    Version = 0x05,
    EchoString = 0x06,
}

/// First payload byte of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0x00,
    Error = 0x01,
    InvalidCommand = 0x02,
    CrcError = 0x03,
}

/// A fully parsed control command, ready to execute against the device
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Read,
    Write(u8),
    Status,
    Reset,
    Version,
    EchoString(#[cfg_attr(feature = "defmt", defmt(Debug2Format))] Vec<u8, MAX_WIRE_PAYLOAD>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    #[error("Received a command with an unrecognized id ({0:?})")]
    Unknown(u8),
    #[error("Received a command ({0:?}) that requires a payload but carried none")]
    MissingPayload(CommandKind),
}

impl Command {
    pub fn from_packet(packet: &Packet) -> Result<Self, CommandError> {
        let kind: CommandKind = packet.command_id().try_into()?;
        let data = packet.data();

        Ok(match kind {
            CommandKind::Read => Self::Read,
            CommandKind::Write => {
                Self::Write(*data.first().ok_or(CommandError::MissingPayload(kind))?)
            }
            CommandKind::Status => Self::Status,
            CommandKind::Reset => Self::Reset,
            CommandKind::Version => Self::Version,
            CommandKind::EchoString => {
                if data.is_empty() {
                    return Err(CommandError::MissingPayload(kind));
                }

                Self::EchoString(Vec::from_slice(data).unwrap())
            }
        })
    }
}

/// Process-wide device state mutated only by command dispatch. Exactly one
/// instance exists, owned by whoever drives the control channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceState {
    status: u8,
    packet_counter: u32,
}

impl DeviceState {
    pub const fn new() -> Self {
        Self {
            status: 0,
            packet_counter: 0,
        }
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    /// Number of requests dispatched since start or the last RESET.
    pub fn packet_counter(&self) -> u32 {
        self.packet_counter
    }

    /// Handles one inbound control transfer and produces the response
    /// transfer.
    ///
    /// Requests that fail decode or validation are answered on the
    /// [`PROTOCOL_ERROR_ID`] path and are not counted. Everything else is
    /// dispatched and counted, including commands that report an
    /// application-level `ERROR` and unknown ids; RESET is the exception so
    /// that the zeroed counter stays observable by the next STATUS.
    pub fn process(&mut self, request: &[u8; PACKET_WIRE_SIZE]) -> [u8; PACKET_WIRE_SIZE] {
        let packet = match Packet::from_wire(request) {
            Ok(packet) => packet,
            Err(_) => return protocol_error(ResultCode::Error),
        };

        if let Err(error) = packet.validate() {
            return protocol_error(error.result_code());
        }

        let parsed = Command::from_packet(&packet);
        let payload = self.execute(&parsed);

        if !matches!(parsed, Ok(Command::Reset)) {
            self.packet_counter = self.packet_counter.wrapping_add(1);
        }

        // Dispatch-path responses always echo the request's command id, even
        // for unknown ids
        Packet::new(packet.command_id(), &payload)
            .unwrap()
            .to_wire()
    }

    fn execute(&mut self, parsed: &Result<Command, CommandError>) -> Vec<u8, MAX_WIRE_PAYLOAD> {
        let mut payload = Vec::new();

        match parsed {
            Ok(Command::Read) => {
                payload.push(ResultCode::Ok.into()).unwrap();
                payload.push(self.status).unwrap();
            }
            Ok(Command::Write(value)) => {
                self.status = *value;
                payload.push(ResultCode::Ok.into()).unwrap();
            }
            Ok(Command::Status) => {
                payload.push(ResultCode::Ok.into()).unwrap();
                payload.push(self.status).unwrap();
                payload
                    .extend_from_slice(&self.packet_counter.to_le_bytes())
                    .unwrap();
            }
            Ok(Command::Reset) => {
                self.status = 0;
                self.packet_counter = 0;
                payload.push(ResultCode::Ok.into()).unwrap();
            }
            Ok(Command::Version) => {
                payload.push(ResultCode::Ok.into()).unwrap();
                payload.extend_from_slice(&DEVICE_VERSION).unwrap();
            }
            Ok(Command::EchoString(data)) => {
                payload.push(ResultCode::Ok.into()).unwrap();

                // The result byte takes one payload slot, so the echo keeps
                // at most MAX_WIRE_PAYLOAD - 1 bytes
                let kept = data.len().min(MAX_WIRE_PAYLOAD - 1);
                payload.extend_from_slice(&data[..kept]).unwrap();
            }
            Err(CommandError::MissingPayload(_)) => {
                payload.push(ResultCode::Error.into()).unwrap();
            }
            Err(CommandError::Unknown(_)) => {
                payload.push(ResultCode::InvalidCommand.into()).unwrap();
            }
        }

        payload
    }
}

fn protocol_error(code: ResultCode) -> [u8; PACKET_WIRE_SIZE] {
    Packet::new(PROTOCOL_ERROR_ID, &[code.into()])
        .unwrap()
        .to_wire()
}
