use crate::command::ResultCode;
use crate::crc::crc16;
use crate::{MAX_DATA_SIZE, MAX_WIRE_PAYLOAD, PACKET_HEADER, PACKET_WIRE_SIZE};

/// A fixed-envelope command/response frame carried in one 64-byte bulk
/// transfer.
///
/// Wire layout: `AA 55`, command id, data length, `data length` payload
/// bytes, then the CRC16 little-endian directly after the payload. The
/// checksum offset therefore depends on the payload length; bytes past it are
/// unused and ignored by the receiver.
///
/// A packet is transient: it is rebuilt from every inbound transfer and
/// serialized fresh for every outbound one. Payload bytes past `data_length`
/// are kept zeroed so that decoding an encoded packet compares equal to the
/// original.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    header: [u8; 2],
    command_id: u8,
    data_length: u8,
    data: [u8; MAX_DATA_SIZE],
    checksum: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    #[error("Declared data length ({0:?}) leaves no room for the trailing checksum")]
    MalformedLength(u8),
    #[error("Payload of ({0:?}) bytes does not fit one bulk transfer")]
    PayloadTooLong(usize),
}

/// Reasons a decoded packet is rejected before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    #[error("Header bytes ({0:?}) are not the 0xAA 0x55 marker")]
    BadHeader([u8; 2]),
    #[error("Data length ({0:?}) exceeds the payload region")]
    BadLength(u8),
    #[error("Stored checksum ({received:?}) does not match the computed one ({computed:?})")]
    CrcMismatch { received: u16, computed: u16 },
}

impl ValidationError {
    /// The result byte reported back to the host for this failure.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::BadHeader(_) | Self::BadLength(_) => ResultCode::Error,
            Self::CrcMismatch { .. } => ResultCode::CrcError,
        }
    }
}

impl Packet {
    /// Builds a packet with the constant header, the given command id and
    /// payload, and a freshly computed checksum. Used for requests on the
    /// host side and for every response on the device side.
    pub fn new(command_id: u8, payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() > MAX_WIRE_PAYLOAD {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }

        let mut data = [0u8; MAX_DATA_SIZE];
        data[..payload.len()].copy_from_slice(payload);

        let mut packet = Self {
            header: PACKET_HEADER,
            command_id,
            data_length: payload.len() as u8,
            data,
            checksum: 0,
        };
        packet.checksum = packet.computed_checksum();

        Ok(packet)
    }

    /// Reconstructs a packet from one inbound transfer. The declared data
    /// length is bound-checked before any payload or checksum byte is
    /// indexed; the header and checksum are kept verbatim for
    /// [`validate`](Packet::validate).
    pub fn from_wire(wire: &[u8; PACKET_WIRE_SIZE]) -> Result<Self, PacketError> {
        let data_length = wire[3];
        let length = data_length as usize;

        if length > MAX_WIRE_PAYLOAD {
            return Err(PacketError::MalformedLength(data_length));
        }

        let mut data = [0u8; MAX_DATA_SIZE];
        data[..length].copy_from_slice(&wire[4..4 + length]);

        Ok(Self {
            header: [wire[0], wire[1]],
            command_id: wire[2],
            data_length,
            data,
            checksum: u16::from_le_bytes([wire[4 + length], wire[5 + length]]),
        })
    }

    /// Serializes the packet into a full transfer buffer. Bytes past the
    /// checksum are zero.
    pub fn to_wire(&self) -> [u8; PACKET_WIRE_SIZE] {
        let mut wire = [0u8; PACKET_WIRE_SIZE];
        let length = self.data_length as usize;

        wire[0] = self.header[0];
        wire[1] = self.header[1];
        wire[2] = self.command_id;
        wire[3] = self.data_length;
        wire[4..4 + length].copy_from_slice(&self.data[..length]);
        wire[4 + length..6 + length].copy_from_slice(&self.checksum.to_le_bytes());

        wire
    }

    /// Checks the header marker, the data length bound and the checksum, in
    /// that order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.header != PACKET_HEADER {
            return Err(ValidationError::BadHeader(self.header));
        }

        if self.data_length as usize > MAX_DATA_SIZE {
            return Err(ValidationError::BadLength(self.data_length));
        }

        let computed = self.computed_checksum();

        if self.checksum != computed {
            return Err(ValidationError::CrcMismatch {
                received: self.checksum,
                computed,
            });
        }

        Ok(())
    }

    /// CRC over the canonical prefix: header, command id, data length and
    /// the valid payload bytes.
    fn computed_checksum(&self) -> u16 {
        let mut prefix = [0u8; 4 + MAX_DATA_SIZE];
        let length = self.data_length as usize;

        prefix[0] = self.header[0];
        prefix[1] = self.header[1];
        prefix[2] = self.command_id;
        prefix[3] = self.data_length;
        prefix[4..4 + length].copy_from_slice(&self.data[..length]);

        crc16(&prefix[..4 + length])
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn data_length(&self) -> u8 {
        self.data_length
    }

    /// The valid payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_length as usize]
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }
}
