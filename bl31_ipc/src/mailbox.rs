// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bus::RegisterBus;
use bl31_areas::{IpcCommand, ShareSlot, DATA_CAPACITY};
use log::error;
use num_traits::FromPrimitive;
use plat_def::{
    IPC_CLEAR_OFFSET, IPC_INT_MAX, IPC_NODE_CORE0, IPC_NODE_CORE1, IPC_SET_OFFSET,
    IPC_STATUS_OFFSET,
};
use thiserror::Error;

/// A mailbox endpoint. Each node owns one bit of the pending-status register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Node(pub u32);

impl Node {
    pub const CORE0: Node = Node(IPC_NODE_CORE0);
    pub const CORE1: Node = Node(IPC_NODE_CORE1);

    fn check(self) -> Result<u32, IpcError> {
        if self.0 >= IPC_INT_MAX {
            error!("ipc node {} out of range", self.0);
            return Err(IpcError::InvalidNode(self.0));
        }
        Ok(self.0)
    }

    fn mask(self) -> u32 {
        1 << self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Spin on the status register until a message shows up. There is no
    /// timeout; a peer that never sends hangs the caller.
    Blocking,
    /// Fail with `IpcError::NoMessage` if nothing is pending.
    NonBlocking,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpcError {
    /// The node number doesn't name a bit in the status register.
    #[error("invalid ipc node {0}")]
    InvalidNode(u32),

    /// More payload words than the share window holds. On send this is caught
    /// before anything touches the hardware; on receive it means the window
    /// holds garbage.
    #[error("payload of {0} words exceeds the share window")]
    TooLong(u32),

    /// The window was torn or overwritten between the sender's write and our
    /// read. The pending flag has already been cleared.
    #[error("ipc checksum mismatch; stored {stored:#x}, computed {computed:#x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// Non-blocking receive found nothing pending.
    #[error("no ipc message pending")]
    NoMessage,
}

impl IpcError {
    /// The integer status reported to C-side callers; every failure is -1.
    pub fn status_code(&self) -> i32 {
        -1
    }
}

/// One mailbox message: an opcode and up to `DATA_CAPACITY` payload words
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub command: u32,
    length: u32,
    payload: [u32; DATA_CAPACITY],
}

impl Message {
    pub fn new(command: u32, data: &[u32]) -> Result<Message, IpcError> {
        if data.len() > DATA_CAPACITY {
            return Err(IpcError::TooLong(data.len() as u32));
        }
        let mut payload = [0; DATA_CAPACITY];
        payload[..data.len()].copy_from_slice(data);
        Ok(Message {
            command,
            length: data.len() as u32,
            payload,
        })
    }

    /// A bare opcode with no payload
    pub fn empty(command: IpcCommand) -> Message {
        Message {
            command: command as u32,
            length: 0,
            payload: [0; DATA_CAPACITY],
        }
    }

    pub fn data(&self) -> &[u32] {
        &self.payload[..self.length as usize]
    }

    /// XOR of the opcode, the length and every payload word.
    pub fn checksum(&self) -> u32 {
        self.data()
            .iter()
            .fold(self.command ^ self.length, |sum, word| sum ^ word)
    }

    pub fn opcode(&self) -> Option<IpcCommand> {
        IpcCommand::from_u32(self.command)
    }
}

/// Message passing over the shared-register block
///
/// There is one share window for the whole block. Nothing arbitrates it:
/// callers must not send while a message is still pending for any node.
pub struct Mailbox<B> {
    bus: B,
}

impl<B: RegisterBus> Mailbox<B> {
    pub const fn new(bus: B) -> Mailbox<B> {
        Mailbox { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Fills the share window, then raises `node`'s pending flag.
    pub fn send(&self, node: Node, msg: &Message) -> Result<(), IpcError> {
        let n = node.check()?;

        self.write_slot(ShareSlot::Command, msg.command);
        self.write_slot(ShareSlot::Length, msg.length);
        for (i, word) in msg.data().iter().enumerate() {
            self.write_slot(ShareSlot::Data(i), *word);
        }
        self.write_slot(ShareSlot::Checksum, msg.checksum());

        self.bus.write32(IPC_SET_OFFSET, n);
        Ok(())
    }

    pub fn has_message(&self, node: Node) -> bool {
        self.bus.read32(IPC_STATUS_OFFSET) & node.mask() != 0
    }

    /// Takes the message pending for `node`.
    ///
    /// Once a message was pending its flag is cleared whether or not it
    /// decoded; a bad message is consumed, not left for a retry.
    pub fn receive(&self, node: Node, wait: Wait) -> Result<Message, IpcError> {
        let n = node.check()?;

        match wait {
            Wait::Blocking => {
                while !self.has_message(node) {
                    core::hint::spin_loop();
                }
            }
            Wait::NonBlocking => {
                if !self.has_message(node) {
                    return Err(IpcError::NoMessage);
                }
            }
        }

        let msg = self.read_window();
        self.bus.write32(IPC_CLEAR_OFFSET, n);

        msg.map_err(|e| {
            error!("ipc receive on node {} failed: {}", n, e);
            e
        })
    }

    fn read_window(&self) -> Result<Message, IpcError> {
        let command = self.read_slot(ShareSlot::Command);
        let length = self.read_slot(ShareSlot::Length);
        if length as usize > DATA_CAPACITY {
            return Err(IpcError::TooLong(length));
        }

        let mut payload = [0; DATA_CAPACITY];
        for (i, word) in payload.iter_mut().enumerate().take(length as usize) {
            *word = self.read_slot(ShareSlot::Data(i));
        }
        let msg = Message {
            command,
            length,
            payload,
        };

        let stored = self.read_slot(ShareSlot::Checksum);
        let computed = msg.checksum();
        if stored != computed {
            return Err(IpcError::ChecksumMismatch { stored, computed });
        }

        Ok(msg)
    }

    // Payload indices are bounded by DATA_CAPACITY before we get here, so
    // every slot has an offset.
    fn write_slot(&self, slot: ShareSlot, value: u32) {
        if let Some(offset) = slot.offset() {
            self.bus.write32(offset, value);
        }
    }

    fn read_slot(&self, slot: ShareSlot) -> u32 {
        slot.offset().map_or(0, |offset| self.bus.read32(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMailbox;

    #[test]
    fn send_then_receive() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let msg = Message::new(0xA3, &[0, 0x4000_0000, 0, 0x4300_0000]).unwrap();

        mailbox.send(Node::CORE0, &msg).unwrap();
        assert!(mailbox.has_message(Node::CORE0));
        assert!(!mailbox.has_message(Node::CORE1));

        let got = mailbox.receive(Node::CORE0, Wait::NonBlocking).unwrap();
        assert_eq!(got, msg);
        assert_eq!(got.opcode(), Some(IpcCommand::StartKernel));
        assert!(!mailbox.has_message(Node::CORE0));
    }

    #[test]
    fn checksum_is_xor_of_header_and_payload() {
        let msg = Message::new(0xA3, &[1, 2, 4]).unwrap();
        assert_eq!(msg.checksum(), 0xA3 ^ 3 ^ 1 ^ 2 ^ 4);
        assert_eq!(Message::empty(IpcCommand::Ack).checksum(), 0xA0);
    }

    #[test]
    fn full_window_fits() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let data: Vec<u32> = (0..DATA_CAPACITY as u32).map(|i| 0x100 + i).collect();
        let msg = Message::new(0x42, &data).unwrap();

        mailbox.send(Node::CORE1, &msg).unwrap();
        let got = mailbox.receive(Node::CORE1, Wait::NonBlocking).unwrap();
        assert_eq!(got.data(), &data[..]);
    }

    #[test]
    fn one_word_too_many_touches_nothing() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let data = [0u32; DATA_CAPACITY + 1];

        assert_eq!(
            Message::new(0x42, &data),
            Err(IpcError::TooLong(DATA_CAPACITY as u32 + 1))
        );
        assert_eq!(sim.write_count(), 0);
        assert!(!mailbox.has_message(Node::CORE0));
    }

    #[test]
    fn invalid_node() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let msg = Message::empty(IpcCommand::Ack);

        assert_eq!(
            mailbox.send(Node(IPC_INT_MAX), &msg),
            Err(IpcError::InvalidNode(IPC_INT_MAX))
        );
        assert_eq!(sim.write_count(), 0);
        assert_eq!(
            mailbox.receive(Node(IPC_INT_MAX), Wait::NonBlocking),
            Err(IpcError::InvalidNode(IPC_INT_MAX))
        );
        assert_eq!(IpcError::InvalidNode(9).status_code(), -1);
    }

    #[test]
    fn corrupted_window_is_consumed() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let msg = Message::new(0xA3, &[0, 0x4000_0000]).unwrap();
        mailbox.send(Node::CORE0, &msg).unwrap();

        // Flip a payload word after the sender sealed it
        let offset = ShareSlot::Data(1).offset().unwrap();
        sim.write32(offset, 0x4000_0001);

        let err = mailbox.receive(Node::CORE0, Wait::NonBlocking).unwrap_err();
        assert!(matches!(err, IpcError::ChecksumMismatch { .. }));
        assert_eq!(err.status_code(), -1);
        assert!(!mailbox.has_message(Node::CORE0));
    }

    #[test]
    fn garbage_length_is_rejected() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        sim.write32(ShareSlot::Length.offset().unwrap(), 200);
        sim.write32(IPC_SET_OFFSET, 0);

        assert_eq!(
            mailbox.receive(Node::CORE0, Wait::NonBlocking),
            Err(IpcError::TooLong(200))
        );
        assert!(!mailbox.has_message(Node::CORE0));
    }

    #[test]
    fn nothing_pending() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);

        assert_eq!(
            mailbox.receive(Node::CORE0, Wait::NonBlocking),
            Err(IpcError::NoMessage)
        );
        assert_eq!(sim.write_count(), 0);
    }
}
