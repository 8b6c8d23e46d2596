use crate::command::DeviceState;
use crate::message::CanMessage;
use crate::relay::FrameRelay;
use crate::PACKET_WIRE_SIZE;

/// The two logical bulk channels multiplexed over the USB device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Framed command/response packets.
    Control,
    /// Raw 18-byte CAN bridge messages.
    Can,
}

/// Byte-level access to the USB bulk endpoints. `read` polls the OUT side of
/// a channel and returns 0 when no transfer has arrived; neither call may
/// block.
pub trait UsbBulk {
    type Error;

    fn read(&mut self, channel: Channel, buffer: &mut [u8]) -> Result<usize, Self::Error>;
    fn write(&mut self, channel: Channel, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Submission side of the CAN controller.
pub trait CanTransmitter {
    type Error;

    fn send(&mut self, message: &CanMessage) -> Result<(), Self::Error>;
}

/// Placeholder transmitter for bridges with no CAN controller wired in.
pub struct NoCan;

impl CanTransmitter for NoCan {
    type Error = core::convert::Infallible;

    fn send(&mut self, _message: &CanMessage) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeError<U, C> {
    #[error("Bulk channel transfer failed")]
    Channel(U),
    #[error("CAN controller rejected the frame")]
    Transmit(C),
}

/// One polling pass over the bridge: control packets in/out, CAN messages
/// in/out.
///
/// Whether the CAN side exists is a construction choice ([`Bridge::new`] vs
/// [`Bridge::with_can`]); the loop itself is the same either way. The bridge
/// owns the only [`DeviceState`] instance; the relay is shared with the
/// frame-arrival interrupt and therefore borrowed.
pub struct Bridge<'a, U, T = NoCan> {
    usb: U,
    state: DeviceState,
    can: Option<CanLink<'a, T>>,
}

struct CanLink<'a, T> {
    transmitter: T,
    relay: &'a FrameRelay,
}

impl<'a, U: UsbBulk> Bridge<'a, U, NoCan> {
    /// A control-only bridge; the CAN channel is never polled.
    pub fn new(usb: U) -> Self {
        Self {
            usb,
            state: DeviceState::new(),
            can: None,
        }
    }
}

impl<'a, U: UsbBulk, T: CanTransmitter> Bridge<'a, U, T> {
    /// A bridge with the CAN side wired in: host-sent messages go to
    /// `transmitter`, frames collected by `relay` go back to the host.
    pub fn with_can(usb: U, transmitter: T, relay: &'a FrameRelay) -> Self {
        Self {
            usb,
            state: DeviceState::new(),
            can: Some(CanLink { transmitter, relay }),
        }
    }

    /// One bounded, non-blocking pass over both channels.
    pub fn poll(&mut self) -> Result<(), BridgeError<U::Error, T::Error>> {
        self.poll_control()?;
        self.poll_can()
    }

    /// Answers one pending control request, if any. Transfers shorter than
    /// the packet envelope are discarded.
    pub fn poll_control(&mut self) -> Result<(), BridgeError<U::Error, T::Error>> {
        let mut buffer = [0u8; PACKET_WIRE_SIZE];
        let count = self
            .usb
            .read(Channel::Control, &mut buffer)
            .map_err(BridgeError::Channel)?;

        if count == PACKET_WIRE_SIZE {
            let response = self.state.process(&buffer);
            self.usb
                .write(Channel::Control, &response)
                .map_err(BridgeError::Channel)?;
        }

        Ok(())
    }

    /// Moves at most one message in each direction across the CAN channel.
    /// Transfers shorter than a CAN bridge message are discarded.
    pub fn poll_can(&mut self) -> Result<(), BridgeError<U::Error, T::Error>> {
        let Some(link) = &mut self.can else {
            return Ok(());
        };

        let mut buffer = [0u8; PACKET_WIRE_SIZE];
        let count = self
            .usb
            .read(Channel::Can, &mut buffer)
            .map_err(BridgeError::Channel)?;

        if let Some(message) = CanMessage::from_wire(&buffer[..count]) {
            link.transmitter
                .send(&message)
                .map_err(BridgeError::Transmit)?;
        }

        if let Some(message) = link.relay.try_take() {
            self.usb
                .write(Channel::Can, &message.to_wire())
                .map_err(BridgeError::Channel)?;
        }

        Ok(())
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn usb(&self) -> &U {
        &self.usb
    }

    pub fn can_transmitter(&self) -> Option<&T> {
        self.can.as_ref().map(|link| &link.transmitter)
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embedded_can::StandardId;
    use heapless::Vec;

    use super::{Bridge, CanTransmitter, Channel, UsbBulk};
    use crate::message::CanMessage;
    use crate::packet::Packet;
    use crate::relay::FrameRelay;
    use crate::{CAN_WIRE_SIZE, PACKET_WIRE_SIZE};

    #[derive(Default)]
    struct MockUsb {
        control_pending: Option<Vec<u8, PACKET_WIRE_SIZE>>,
        can_pending: Option<Vec<u8, PACKET_WIRE_SIZE>>,
        control_written: Vec<Vec<u8, PACKET_WIRE_SIZE>, 4>,
        can_written: Vec<Vec<u8, PACKET_WIRE_SIZE>, 4>,
    }

    impl UsbBulk for MockUsb {
        type Error = Infallible;

        fn read(&mut self, channel: Channel, buffer: &mut [u8]) -> Result<usize, Self::Error> {
            let pending = match channel {
                Channel::Control => &mut self.control_pending,
                Channel::Can => &mut self.can_pending,
            };

            Ok(match pending.take() {
                Some(bytes) => {
                    buffer[..bytes.len()].copy_from_slice(&bytes);
                    bytes.len()
                }
                None => 0,
            })
        }

        fn write(&mut self, channel: Channel, bytes: &[u8]) -> Result<(), Self::Error> {
            let written = match channel {
                Channel::Control => &mut self.control_written,
                Channel::Can => &mut self.can_written,
            };
            written.push(Vec::from_slice(bytes).unwrap()).unwrap();

            Ok(())
        }
    }

    #[derive(Default)]
    struct MockCan {
        sent: Vec<CanMessage, 4>,
    }

    impl CanTransmitter for MockCan {
        type Error = Infallible;

        fn send(&mut self, message: &CanMessage) -> Result<(), Self::Error> {
            self.sent.push(*message).unwrap();
            Ok(())
        }
    }

    #[test]
    fn control_request_gets_a_response() {
        let mut usb = MockUsb::default();
        usb.control_pending =
            Some(Vec::from_slice(&Packet::new(0x05, &[]).unwrap().to_wire()).unwrap());

        let mut bridge = Bridge::new(usb);
        bridge.poll().unwrap();

        let written = &bridge.usb().control_written;
        assert_eq!(written.len(), 1);

        let response =
            Packet::from_wire(written[0].as_slice().try_into().unwrap()).unwrap();
        response.validate().unwrap();
        assert_eq!(response.command_id(), 0x05);
        assert_eq!(response.data(), &[0x00, 1, 0, 0]);
        assert_eq!(bridge.device_state().packet_counter(), 1);
    }

    #[test]
    fn short_control_transfers_are_discarded() {
        let mut usb = MockUsb::default();
        usb.control_pending = Some(Vec::from_slice(&[0xAA, 0x55, 0x01, 0x00]).unwrap());

        let mut bridge = Bridge::new(usb);
        bridge.poll().unwrap();

        assert!(bridge.usb().control_written.is_empty());
        assert_eq!(bridge.device_state().packet_counter(), 0);
    }

    #[test]
    fn host_message_reaches_the_transmitter() {
        let message = CanMessage::new(StandardId::new(0x123).unwrap(), &[0x01, 0x02]).unwrap();
        let relay = FrameRelay::new();

        let mut usb = MockUsb::default();
        usb.can_pending = Some(Vec::from_slice(&message.to_wire()).unwrap());

        let mut bridge = Bridge::with_can(usb, MockCan::default(), &relay);
        bridge.poll().unwrap();

        let sent = &bridge.can_transmitter().unwrap().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].raw_id(), 0x123);
        assert_eq!(sent[0].data(), &[0x01, 0x02]);
    }

    #[test]
    fn sub_minimum_can_transfers_are_discarded() {
        let mut usb = MockUsb::default();
        usb.can_pending = Some(Vec::from_slice(&[0u8; CAN_WIRE_SIZE - 1]).unwrap());

        let relay = FrameRelay::new();
        let mut bridge = Bridge::with_can(usb, MockCan::default(), &relay);
        bridge.poll().unwrap();

        assert!(bridge.can_transmitter().unwrap().sent.is_empty());
    }

    #[test]
    fn relayed_frame_is_written_to_the_host() {
        let relay = FrameRelay::new();
        relay.on_frame_received(
            CanMessage::new(StandardId::new(0x321).unwrap(), &[0xAB]).unwrap(),
        );

        let mut bridge = Bridge::with_can(MockUsb::default(), MockCan::default(), &relay);
        bridge.poll().unwrap();

        let written = &bridge.usb().can_written;
        assert_eq!(written.len(), 1);

        let message = CanMessage::from_wire(written[0].as_slice()).unwrap();
        assert_eq!(message.raw_id(), 0x321);
        assert_eq!(message.data(), &[0xAB]);
        assert_eq!(message.timestamp(), 0);

        // The slot is empty now, a second poll writes nothing
        bridge.poll().unwrap();
        assert_eq!(bridge.usb().can_written.len(), 1);
    }
}
