// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register and record layouts shared by the EL3 mailbox and NMI code.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod regs;
mod snapshot;
mod window;

pub use regs::{
    InterruptGroup, InterruptProp, SecureInterrupt, SgiRegister, Spsr, Trigger,
    G0_INTERRUPT_PROPS,
};
pub use snapshot::{ContextSnapshot, SnapshotError, SNAPSHOT_BODY_LEN};
pub use window::{IpcCommand, ShareSlot, DATA_CAPACITY};
