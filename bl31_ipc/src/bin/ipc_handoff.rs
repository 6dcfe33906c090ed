// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plays both sides of the boot handoff over a simulated mailbox: one thread
//! is BL31 on the boot core, the main thread is the loader on the other.

use anyhow::{bail, Result};
use bl31_areas::{IpcCommand, ShareSlot};
use bl31_ipc::sim::SimulatedMailbox;
use bl31_ipc::{
    BootTarget, HandoffSender, Mailbox, Message, NextImages, Node, RegisterBus, Reply,
    SecurityState, Wait,
};
use clap::Parser;
use plat_def::IPC_SET_OFFSET;

#[derive(Debug, Parser)]
#[clap(name = "ipc-handoff", max_term_width = 80)]
struct Args {
    /// Kernel entry point to hand over
    #[arg(long, value_parser = parse_int::parse::<u64>, default_value = "0x40080000")]
    kernel: u64,

    /// Address of the boot data passed to the kernel in x0
    #[arg(long, value_parser = parse_int::parse::<u64>, default_value = "0x43000000")]
    boot_data: u64,

    /// Send a message with this opcode, and the START_KERNEL payload, before
    /// the real START_KERNEL (repeatable)
    #[arg(long, value_parser = parse_int::parse::<u32>)]
    noise: Vec<u32>,

    /// Send a START_KERNEL with a bad checksum first
    #[arg(long)]
    corrupt: bool,
}

/// Puts a START_KERNEL in the window with its checksum off by one and raises
/// the boot core's flag, the way a torn write would look.
fn send_garbled(sim: &SimulatedMailbox, target: BootTarget) {
    let slot = |s: ShareSlot| s.offset().unwrap_or_default();
    let words = target.to_words();
    let good = Message::new(IpcCommand::StartKernel as u32, &words)
        .map(|m| m.checksum())
        .unwrap_or_default();

    sim.write32(slot(ShareSlot::Command), IpcCommand::StartKernel as u32);
    sim.write32(slot(ShareSlot::Length), words.len() as u32);
    for (i, w) in words.iter().enumerate() {
        sim.write32(slot(ShareSlot::Data(i)), *w);
    }
    sim.write32(slot(ShareSlot::Checksum), good ^ 1);
    sim.write32(IPC_SET_OFFSET, Node::CORE0.0);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let target = BootTarget {
        kernel_entry: args.kernel,
        boot_data: args.boot_data,
    };

    let sim = SimulatedMailbox::new();
    let mailbox = Mailbox::new(&sim);

    let ep = std::thread::scope(|s| -> Result<_> {
        let bl31 = s.spawn(|| {
            let mut images = NextImages::new();
            images
                .next_image_ep_info(SecurityState::NonSecure, &mailbox)
                .copied()
        });

        let loader = HandoffSender::for_loader_core(&mailbox);

        if args.corrupt {
            send_garbled(&sim, target);
            // No reply is coming; wait for it to be consumed
            while mailbox.has_message(Node::CORE0) {
                std::hint::spin_loop();
            }
            println!("garbled START_KERNEL dropped");
        }

        for opcode in &args.noise {
            if *opcode == IpcCommand::StartKernel as u32 {
                bail!("{:#x} is START_KERNEL, not noise", opcode);
            }
            loader.send(&Message::new(*opcode, &target.to_words())?)?;
            match loader.await_reply(Wait::Blocking)? {
                Reply::NeedKernel => println!("{:#x}: NEED_KERNEL", opcode),
                other => bail!("{:#x}: unexpected reply {:?}", opcode, other),
            }
        }

        loader.send_start_kernel(target)?;
        let reply = loader.await_reply(Wait::Blocking)?;
        if reply != Reply::Ack {
            bail!("START_KERNEL answered with {:?}", reply);
        }
        println!("START_KERNEL acknowledged");

        match bl31.join() {
            Ok(ep) => Ok(ep),
            Err(_) => bail!("BL31 thread panicked"),
        }
    })?;

    match ep {
        Some(ep) => println!(
            "BL33 entry: pc {:#x}, x0 {:#x}, spsr {:#x}",
            ep.pc,
            ep.args[0],
            ep.spsr.bits()
        ),
        None => bail!("no BL33 entry point"),
    }

    Ok(())
}
