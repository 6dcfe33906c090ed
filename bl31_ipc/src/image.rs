// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bus::RegisterBus;
use crate::handoff::HandoffReceiver;
use crate::mailbox::Mailbox;
use bl31_areas::Spsr;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SecurityState {
    Secure,
    NonSecure,
}

/// Where, and in what state, a next stage (BL32 or BL33) is entered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryPointInfo {
    pub pc: u64,
    /// `spsr_el3` to program before `eret`
    pub spsr: Spsr,
    /// `x0`-`x7` on entry
    pub args: [u64; 8],
}

impl EntryPointInfo {
    pub fn new(pc: u64, spsr: Spsr) -> EntryPointInfo {
        EntryPointInfo {
            pc,
            spsr,
            args: [0; 8],
        }
    }
}

/// Entry points of the stages BL31 hands over to.
///
/// The secure image is known from early setup. The non-secure one comes from
/// the loader core over the mailbox, the first time anyone asks for it.
#[derive(Debug, Default)]
pub struct NextImages {
    bl32: Option<EntryPointInfo>,
    bl33: Option<EntryPointInfo>,
}

impl NextImages {
    pub const fn new() -> NextImages {
        NextImages {
            bl32: None,
            bl33: None,
        }
    }

    /// Records the secure payload, from the first argument of early setup.
    /// Only the entry point is known here; the SPSR is left for the secure
    /// payload dispatcher to fill in.
    pub fn set_bl32(&mut self, pc: u64) {
        self.bl32 = Some(EntryPointInfo::new(pc, Spsr::from(0)));
    }

    /// Entry point for the image running in `state`.
    ///
    /// For the non-secure image this blocks in the boot handoff on first use.
    pub fn next_image_ep_info<B: RegisterBus>(
        &mut self,
        state: SecurityState,
        mailbox: &Mailbox<B>,
    ) -> Option<&EntryPointInfo> {
        match state {
            SecurityState::Secure => self.bl32.as_ref(),
            SecurityState::NonSecure => {
                if self.bl33.is_none() {
                    let target = HandoffReceiver::for_boot_core(mailbox).wait_for_kernel();
                    let mut ep = EntryPointInfo::new(target.kernel_entry, Spsr::el1h_all_masked());
                    ep.args[0] = target.boot_data;
                    self.bl33 = Some(ep);
                }
                self.bl33.as_ref()
            }
        }
    }
}
