use embedded_can::{ExtendedId, Id, StandardId};

use crate::CAN_WIRE_SIZE;

/// Bit 0 of [`CanMessage::properties`]: set when the identifier is a 29-bit
/// extended id.
pub const PROPERTY_EXTENDED_ID: u8 = 0x01;

/// One CAN bus frame plus bridge metadata.
///
/// `timestamp` is a monotonic per-frame counter stamped by the receive
/// relay, not a wall-clock value. `id` holds the raw 11-bit or 29-bit value;
/// the left-aligned controller register form lives behind [`register_id`]
/// and [`raw_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanMessage {
    timestamp: u32,
    id: u32,
    data: [u8; 8],
    length: u8,
    properties: u8,
}

impl CanMessage {
    /// Creates a message from a typed identifier and up to 8 data bytes.
    /// Returns `None` when the payload is longer than one CAN frame.
    pub fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }

        let mut copy = [0u8; 8];
        copy[..data.len()].copy_from_slice(data);

        let (raw, properties) = match id.into() {
            Id::Standard(standard_id) => (standard_id.as_raw() as u32, 0),
            Id::Extended(extended_id) => (extended_id.as_raw(), PROPERTY_EXTENDED_ID),
        };

        Some(Self {
            timestamp: 0,
            id: raw,
            data: copy,
            length: data.len() as u8,
            properties,
        })
    }

    /// Unpacks the 18-byte USB representation. Only buffers of at least 18
    /// bytes are accepted; additional bytes are ignored. A declared length
    /// over 8 is clamped to one frame's worth of data.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CAN_WIRE_SIZE {
            return None;
        }

        let mut data = [0u8; 8];
        data.copy_from_slice(&bytes[8..16]);

        Some(Self {
            timestamp: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            id: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            data,
            length: bytes[16].min(8),
            properties: bytes[17],
        })
    }

    /// Packs the message into its 18-byte USB representation: timestamp and
    /// id little-endian, the full zero-padded data region, then length and
    /// properties.
    pub fn to_wire(&self) -> [u8; CAN_WIRE_SIZE] {
        let mut wire = [0u8; CAN_WIRE_SIZE];

        wire[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        wire[4..8].copy_from_slice(&self.id.to_le_bytes());
        wire[8..16].copy_from_slice(&self.data);
        wire[16] = self.length;
        wire[17] = self.properties;

        wire
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// The raw numeric identifier value.
    pub fn raw_id(&self) -> u32 {
        self.id
    }

    /// The identifier viewed through the extended-id property bit. `None`
    /// when the raw value is out of range for its declared kind.
    pub fn can_id(&self) -> Option<Id> {
        if self.is_extended() {
            ExtendedId::new(self.id).map(Id::Extended)
        } else {
            u16::try_from(self.id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        }
    }

    /// The valid data bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }

    /// The frame's DLC.
    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn properties(&self) -> u8 {
        self.properties
    }

    pub fn is_extended(&self) -> bool {
        self.properties & PROPERTY_EXTENDED_ID != 0
    }
}

/// Encodes a raw identifier the way the controller's TX id register expects
/// it: standard ids occupy bits [31:21], extended ids bits [31:3]. Returns
/// the register value and whether the IDE flag must be set; values over
/// 0x7FF are treated as extended.
pub fn register_id(raw: u32) -> (u32, bool) {
    if raw <= StandardId::MAX.as_raw() as u32 {
        (raw << 21, false)
    } else {
        (raw << 3, true)
    }
}

/// Inverse of [`register_id`] for a captured frame. The shift is selected by
/// the IDE flag that came with the frame, not by the value.
pub fn raw_id(register: u32, extended: bool) -> u32 {
    if extended {
        register >> 3
    } else {
        register >> 21
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::{ExtendedId, Id, StandardId};

    use super::{raw_id, register_id, CanMessage, PROPERTY_EXTENDED_ID};
    use crate::CAN_WIRE_SIZE;

    #[test]
    fn wire_layout() {
        let mut message =
            CanMessage::new(StandardId::new(0x123).unwrap(), &[0xDE, 0xAD]).unwrap();
        message.set_timestamp(0x0403_0201);

        let wire = message.to_wire();

        assert_eq!(&wire[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&wire[4..8], &[0x23, 0x01, 0x00, 0x00]);
        assert_eq!(&wire[8..16], &[0xDE, 0xAD, 0, 0, 0, 0, 0, 0]);
        assert_eq!(wire[16], 2);
        assert_eq!(wire[17], 0);

        assert_eq!(CanMessage::from_wire(&wire), Some(message));
    }

    #[test]
    fn from_wire_needs_eighteen_bytes() {
        assert_eq!(CanMessage::from_wire(&[0u8; CAN_WIRE_SIZE - 1]), None);

        // Trailing bytes of a larger transfer are ignored
        let mut buffer = [0u8; 64];
        buffer[4] = 0x23;
        buffer[5] = 0x01;
        buffer[16] = 1;
        buffer[63] = 0xFF;

        let message = CanMessage::from_wire(&buffer).unwrap();
        assert_eq!(message.raw_id(), 0x123);
        assert_eq!(message.length(), 1);
    }

    #[test]
    fn from_wire_clamps_length() {
        let mut wire = [0u8; CAN_WIRE_SIZE];
        wire[16] = 9;

        assert_eq!(CanMessage::from_wire(&wire).unwrap().length(), 8);
    }

    #[test]
    fn new_rejects_oversized_payloads() {
        assert_eq!(CanMessage::new(StandardId::ZERO, &[0u8; 9]), None);
    }

    #[test]
    fn new_sets_the_extended_property() {
        let standard = CanMessage::new(StandardId::new(0x123).unwrap(), &[]).unwrap();
        assert!(!standard.is_extended());
        assert_eq!(standard.can_id(), Some(Id::Standard(StandardId::new(0x123).unwrap())));

        let extended = CanMessage::new(ExtendedId::new(0x1ABCDE).unwrap(), &[]).unwrap();
        assert_eq!(extended.properties(), PROPERTY_EXTENDED_ID);
        assert_eq!(extended.can_id(), Some(Id::Extended(ExtendedId::new(0x1ABCDE).unwrap())));
    }

    #[test]
    fn register_id_round_trips() {
        let (register, extended) = register_id(0x123);
        assert_eq!(register, 0x123 << 21);
        assert!(!extended);
        assert_eq!(raw_id(register, extended), 0x123);

        let (register, extended) = register_id(0x1ABCDE);
        assert_eq!(register, 0x1ABCDE << 3);
        assert!(extended);
        assert_eq!(raw_id(register, extended), 0x1ABCDE);
    }

    #[test]
    fn register_id_boundary() {
        assert_eq!(register_id(0x7FF), (0x7FF << 21, false));
        assert_eq!(register_id(0x800), (0x800 << 3, true));
    }
}
