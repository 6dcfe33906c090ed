// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bl31_areas::IpcCommand;
use bl31_ipc::sim::SimulatedMailbox;
use bl31_ipc::{
    BootTarget, HandoffReceiver, HandoffSender, HandoffState, Mailbox, Message, Node, Reply, Wait,
};

#[test]
fn blocking_receive_sees_the_other_core() {
    let sim = SimulatedMailbox::new();
    let mailbox = Mailbox::new(&sim);
    let msg = Message::new(0x55, &[7, 8, 9]).unwrap();

    let got = std::thread::scope(|s| {
        let core1 = s.spawn(|| mailbox.receive(Node::CORE1, Wait::Blocking));
        mailbox.send(Node::CORE1, &msg).unwrap();
        core1.join().unwrap()
    });

    assert_eq!(got, Ok(msg));
    assert!(!mailbox.has_message(Node::CORE1));
}

#[test]
fn handoff_happy_path() {
    let sim = SimulatedMailbox::new();
    let mailbox = Mailbox::new(&sim);

    let target = std::thread::scope(|s| {
        let bl31 = s.spawn(|| HandoffReceiver::for_boot_core(&mailbox).wait_for_kernel());

        let loader = HandoffSender::for_loader_core(&mailbox);
        loader
            .send(&Message::new(0xA3, &[0x0000_0000, 0x4000_0000, 0x0000_0000, 0x4300_0000]).unwrap())
            .unwrap();
        assert_eq!(loader.await_reply(Wait::Blocking), Ok(Reply::Ack));

        bl31.join().unwrap()
    });

    assert_eq!(
        target,
        BootTarget {
            kernel_entry: 0x4000_0000,
            boot_data: 0x4300_0000,
        }
    );
}

#[test]
fn unexpected_opcode_keeps_the_receiver_waiting() {
    let sim = SimulatedMailbox::new();
    let mailbox = Mailbox::new(&sim);
    let loader = HandoffSender::for_loader_core(&mailbox);
    let mut receiver = HandoffReceiver::for_boot_core(&mailbox);

    for opcode in [0x0, IpcCommand::StartBl31 as u32, 0xdead_beef] {
        loader.send(&Message::new(opcode, &[1, 2, 3, 4]).unwrap()).unwrap();
        assert_eq!(receiver.step(Wait::Blocking), HandoffState::NackedWaiting);
        assert_eq!(loader.await_reply(Wait::NonBlocking), Ok(Reply::NeedKernel));
    }

    // Still listening: the real thing gets through afterwards
    let target = BootTarget {
        kernel_entry: 0x4000_0000,
        boot_data: 0x4300_0000,
    };
    loader.send_start_kernel(target).unwrap();
    assert_eq!(receiver.step(Wait::Blocking), HandoffState::Ready(target));
}

#[test]
fn empty_message_is_dropped_without_a_reply() {
    let sim = SimulatedMailbox::new();
    let mailbox = Mailbox::new(&sim);
    let target = BootTarget {
        kernel_entry: 0x4000_0000,
        boot_data: 0x4300_0000,
    };

    let got = std::thread::scope(|s| {
        let bl31 = s.spawn(|| HandoffReceiver::for_boot_core(&mailbox).wait_for_kernel());

        let loader = HandoffSender::for_loader_core(&mailbox);
        loader.send(&Message::empty(IpcCommand::Ack)).unwrap();
        // Taken off the window, but nothing comes back
        while mailbox.has_message(Node::CORE0) {
            std::hint::spin_loop();
        }
        assert!(!mailbox.has_message(Node::CORE1));

        loader.send_start_kernel(target).unwrap();
        assert_eq!(loader.await_reply(Wait::Blocking), Ok(Reply::Ack));
        bl31.join().unwrap()
    });

    assert_eq!(got, target);
}
