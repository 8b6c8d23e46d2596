#![no_std]

mod bridge;
mod command;
mod crc;
mod message;
mod packet;
mod relay;

// Control request, WRITE, one payload byte, trailing CRC16 little-endian:
// AA 55 02 01 42 6F 81 (rest of the 64-byte transfer unused)

/// Start-of-frame marker carried by every control packet.
pub const PACKET_HEADER: [u8; 2] = [0xAA, 0x55];

/// Size of the payload region inside a control packet.
pub const MAX_DATA_SIZE: usize = 60;

/// Size of one control transfer. Every command and response occupies a full
/// bulk buffer regardless of payload length.
pub const PACKET_WIRE_SIZE: usize = 64;

/// Largest payload whose trailing two checksum bytes still fit inside the
/// 64-byte transfer (the checksum directly follows the payload).
pub const MAX_WIRE_PAYLOAD: usize = PACKET_WIRE_SIZE - 6;

/// Size of one CAN bridge message on the USB side.
pub const CAN_WIRE_SIZE: usize = 18;

pub use bridge::*;
pub use command::*;
pub use crc::crc16;
pub use message::*;
pub use packet::*;
pub use relay::*;

pub use embedded_can::{ExtendedId, Id, StandardId};
