use core::cell::RefCell;

use critical_section::Mutex;

use crate::message::CanMessage;

/// Single-slot hand-off of received CAN frames from interrupt context to the
/// polling mainline.
///
/// The producer overwrites unconditionally: a frame arriving while the slot
/// is still full replaces the one the mainline has not collected yet.
/// Newest-wins is the intended backpressure policy, there is no queue and a
/// dropped frame is not an error. The slot lives behind a critical-section
/// mutex so the consumer can never observe a partially written message.
///
/// `const fn new` and `&self` methods allow a `static` relay shared between
/// both contexts.
pub struct FrameRelay {
    slot: Mutex<RefCell<Slot>>,
}

struct Slot {
    message: Option<CanMessage>,
    next_timestamp: u32,
}

impl FrameRelay {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(Slot {
                message: None,
                next_timestamp: 0,
            })),
        }
    }

    /// Producer side, called from the frame-arrival interrupt. Stamps the
    /// message with the next timestamp counter value and fills the slot.
    pub fn on_frame_received(&self, mut message: CanMessage) {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);

            message.set_timestamp(slot.next_timestamp);
            slot.next_timestamp = slot.next_timestamp.wrapping_add(1);
            slot.message = Some(message);
        });
    }

    /// Consumer side. Empties the slot and returns its message, or `None`
    /// when no frame arrived since the last take.
    pub fn try_take(&self) -> Option<CanMessage> {
        critical_section::with(|cs| self.slot.borrow_ref_mut(cs).message.take())
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}
