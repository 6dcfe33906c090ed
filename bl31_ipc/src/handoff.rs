// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Getting the kernel's whereabouts from the core that loaded it.
//!
//! The loader sends `START_KERNEL` with the kernel entry point and the boot
//! data address as four words, high half first:
//!
//! ```text
//! | kernel hi | kernel lo | boot data hi | boot data lo |
//! ```
//!
//! and we answer `ACK`. Any other message with a payload gets `NEED_KERNEL`
//! and we keep waiting. Messages that are garbled or carry no payload at all
//! are dropped without a reply.

use crate::bus::RegisterBus;
use crate::mailbox::{IpcError, Mailbox, Message, Node, Wait};
use bl31_areas::IpcCommand;
use log::{debug, error, info, warn};

/// Where the next stage starts, as announced by the loader
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootTarget {
    pub kernel_entry: u64,
    pub boot_data: u64,
}

impl BootTarget {
    pub fn to_words(self) -> [u32; 4] {
        [
            (self.kernel_entry >> 32) as u32,
            self.kernel_entry as u32,
            (self.boot_data >> 32) as u32,
            self.boot_data as u32,
        ]
    }

    /// Decodes the first four payload words; `None` if there aren't four.
    pub fn from_words(words: &[u32]) -> Option<BootTarget> {
        match *words {
            [kernel_hi, kernel_lo, data_hi, data_lo, ..] => Some(BootTarget {
                kernel_entry: (u64::from(kernel_hi) << 32) | u64::from(kernel_lo),
                boot_data: (u64::from(data_hi) << 32) | u64::from(data_lo),
            }),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandoffState {
    /// Nothing useful received yet
    Waiting,
    /// The last message was the wrong one and was answered with `NEED_KERNEL`
    NackedWaiting,
    /// Acknowledged; terminal
    Ready(BootTarget),
}

/// The EL3 side of the handoff
pub struct HandoffReceiver<'a, B> {
    mailbox: &'a Mailbox<B>,
    own: Node,
    peer: Node,
    state: HandoffState,
}

impl<'a, B: RegisterBus> HandoffReceiver<'a, B> {
    pub fn new(mailbox: &'a Mailbox<B>, own: Node, peer: Node) -> Self {
        HandoffReceiver {
            mailbox,
            own,
            peer,
            state: HandoffState::Waiting,
        }
    }

    /// Receives on CORE0, replies to CORE1.
    pub fn for_boot_core(mailbox: &'a Mailbox<B>) -> Self {
        Self::new(mailbox, Node::CORE0, Node::CORE1)
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    /// Handles at most one message.
    ///
    /// A message that fails to decode, or that has no payload, is dropped
    /// without a reply; the loader is expected to notice the missing reply and
    /// send again.
    pub fn step(&mut self, wait: Wait) -> HandoffState {
        if let HandoffState::Ready(_) = self.state {
            return self.state;
        }

        let msg = match self.mailbox.receive(self.own, wait) {
            Ok(msg) => msg,
            Err(IpcError::NoMessage) => return self.state,
            Err(e) => {
                warn!("dropping garbled handoff message: {}", e);
                return self.state;
            }
        };

        if msg.data().is_empty() {
            warn!("dropping empty handoff message {:#x}", msg.command);
            return self.state;
        }

        let target = match msg.opcode() {
            Some(IpcCommand::StartKernel) => BootTarget::from_words(msg.data()),
            _ => None,
        };

        match target {
            Some(target) => {
                self.reply(IpcCommand::Ack);
                info!(
                    "kernel at {:#x}, boot data at {:#x}",
                    target.kernel_entry, target.boot_data
                );
                self.state = HandoffState::Ready(target);
            }
            None => {
                debug!(
                    "unexpected handoff message {:#x} with {} words",
                    msg.command,
                    msg.data().len()
                );
                self.reply(IpcCommand::NeedKernel);
                self.state = HandoffState::NackedWaiting;
            }
        }
        self.state
    }

    /// Blocks until the loader has told us where the kernel is.
    pub fn wait_for_kernel(&mut self) -> BootTarget {
        loop {
            if let HandoffState::Ready(target) = self.step(Wait::Blocking) {
                return target;
            }
        }
    }

    fn reply(&self, command: IpcCommand) {
        if let Err(e) = self.mailbox.send(self.peer, &Message::empty(command)) {
            error!("failed to send {} to node {}: {}", command, self.peer.0, e);
        }
    }
}

/// What the EL3 side said back
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ack,
    NeedKernel,
    Other(u32),
}

/// The loader's side of the handoff
pub struct HandoffSender<'a, B> {
    mailbox: &'a Mailbox<B>,
    own: Node,
    peer: Node,
}

impl<'a, B: RegisterBus> HandoffSender<'a, B> {
    pub fn new(mailbox: &'a Mailbox<B>, own: Node, peer: Node) -> Self {
        HandoffSender { mailbox, own, peer }
    }

    /// Sends on CORE0, listens for replies on CORE1.
    pub fn for_loader_core(mailbox: &'a Mailbox<B>) -> Self {
        Self::new(mailbox, Node::CORE1, Node::CORE0)
    }

    /// Sends `msg` once the previous message to the peer has been taken.
    pub fn send(&self, msg: &Message) -> Result<(), IpcError> {
        while self.mailbox.has_message(self.peer) {
            core::hint::spin_loop();
        }
        self.mailbox.send(self.peer, msg)
    }

    pub fn send_start_kernel(&self, target: BootTarget) -> Result<(), IpcError> {
        let msg = Message::new(IpcCommand::StartKernel as u32, &target.to_words())?;
        self.send(&msg)
    }

    pub fn await_reply(&self, wait: Wait) -> Result<Reply, IpcError> {
        let msg = self.mailbox.receive(self.own, wait)?;
        Ok(match msg.opcode() {
            Some(IpcCommand::Ack) => Reply::Ack,
            Some(IpcCommand::NeedKernel) => Reply::NeedKernel,
            _ => Reply::Other(msg.command),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMailbox;

    const TARGET: BootTarget = BootTarget {
        kernel_entry: 0x0000_0000_4008_0000,
        boot_data: 0x0000_0000_4300_0000,
    };

    #[test]
    fn words_are_high_half_first() {
        let target = BootTarget {
            kernel_entry: 0x1_2345_6789,
            boot_data: 0xffff_0000_0000_0001,
        };
        let words = target.to_words();
        assert_eq!(words, [0x1, 0x2345_6789, 0xffff_0000, 0x1]);
        assert_eq!(BootTarget::from_words(&words), Some(target));
        assert_eq!(BootTarget::from_words(&words[..3]), None);
    }

    #[test]
    fn start_kernel_is_acked() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let mut receiver = HandoffReceiver::for_boot_core(&mailbox);
        let sender = HandoffSender::for_loader_core(&mailbox);

        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::Waiting);

        sender.send_start_kernel(TARGET).unwrap();
        assert_eq!(
            receiver.step(Wait::NonBlocking),
            HandoffState::Ready(TARGET)
        );
        assert_eq!(sender.await_reply(Wait::NonBlocking), Ok(Reply::Ack));

        // Terminal: later traffic is left alone
        sender.send(&Message::empty(IpcCommand::NeedBl31)).unwrap();
        assert_eq!(
            receiver.step(Wait::NonBlocking),
            HandoffState::Ready(TARGET)
        );
        assert!(mailbox.has_message(Node::CORE0));
    }

    #[test]
    fn wrong_opcode_is_nacked() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let mut receiver = HandoffReceiver::for_boot_core(&mailbox);
        let sender = HandoffSender::for_loader_core(&mailbox);

        sender
            .send(&Message::new(0x42, &[1, 2, 3, 4]).unwrap())
            .unwrap();
        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::NackedWaiting);
        assert_eq!(sender.await_reply(Wait::NonBlocking), Ok(Reply::NeedKernel));

        sender.send_start_kernel(TARGET).unwrap();
        assert_eq!(
            receiver.step(Wait::NonBlocking),
            HandoffState::Ready(TARGET)
        );
        assert_eq!(sender.await_reply(Wait::NonBlocking), Ok(Reply::Ack));
    }

    #[test]
    fn short_start_kernel_is_nacked() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let mut receiver = HandoffReceiver::for_boot_core(&mailbox);
        let sender = HandoffSender::for_loader_core(&mailbox);

        sender
            .send(&Message::new(IpcCommand::StartKernel as u32, &[0, 0x4008_0000]).unwrap())
            .unwrap();
        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::NackedWaiting);
        assert_eq!(sender.await_reply(Wait::NonBlocking), Ok(Reply::NeedKernel));
    }

    #[test]
    fn empty_message_gets_no_reply() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let mut receiver = HandoffReceiver::for_boot_core(&mailbox);
        let sender = HandoffSender::for_loader_core(&mailbox);

        sender.send(&Message::empty(IpcCommand::Ack)).unwrap();
        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::Waiting);
        assert!(!mailbox.has_message(Node::CORE0));
        assert_eq!(
            sender.await_reply(Wait::NonBlocking),
            Err(IpcError::NoMessage)
        );

        // A nack already given stays in place
        sender
            .send(&Message::new(0x42, &[1]).unwrap())
            .unwrap();
        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::NackedWaiting);
        assert_eq!(sender.await_reply(Wait::NonBlocking), Ok(Reply::NeedKernel));
        sender
            .send(&Message::empty(IpcCommand::StartKernel))
            .unwrap();
        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::NackedWaiting);
        assert_eq!(
            sender.await_reply(Wait::NonBlocking),
            Err(IpcError::NoMessage)
        );
    }

    #[test]
    fn garbled_message_gets_no_reply() {
        let sim = SimulatedMailbox::new();
        let mailbox = Mailbox::new(&sim);
        let mut receiver = HandoffReceiver::for_boot_core(&mailbox);
        let sender = HandoffSender::for_loader_core(&mailbox);

        sender.send_start_kernel(TARGET).unwrap();
        let checksum = bl31_areas::ShareSlot::Checksum.offset().unwrap();
        sim.write32(checksum, sim.read32(checksum) ^ 1);

        assert_eq!(receiver.step(Wait::NonBlocking), HandoffState::Waiting);
        assert!(!mailbox.has_message(Node::CORE0));
        assert_eq!(
            sender.await_reply(Wait::NonBlocking),
            Err(IpcError::NoMessage)
        );
    }
}
