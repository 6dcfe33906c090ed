// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inter-core mailbox and the boot handoff that runs over it.
//!
//! Nothing in here allocates; all of it runs at EL3 before the next stage is
//! entered.

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod handoff;
pub mod image;
pub mod mailbox;
pub mod sim;

pub use bus::{MmioBus, RegisterBus};
pub use handoff::{BootTarget, HandoffReceiver, HandoffSender, HandoffState, Reply};
pub use image::{EntryPointInfo, NextImages, SecurityState};
pub use mailbox::{IpcError, Mailbox, Message, Node, Wait};
