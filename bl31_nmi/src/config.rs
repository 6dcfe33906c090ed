// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::arch;
use core::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};

/// Where to send an interrupted core, and where to leave its registers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub transfer_address: u64,
    pub context_base: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RedirectState {
    /// At least one address is still zero; NMIs are not redirected.
    Unconfigured,
    /// Both addresses are set but the interrupt sources aren't programmed.
    Configured(Redirect),
    /// Both addresses are set and the GIC will deliver the watchdog to EL3.
    Armed(Redirect),
}

/// The OS's NMI redirect settings, shared by every core.
///
/// Written by the SMC handler on whichever core the OS calls from, read by
/// the NMI path on all of them. Writers `publish` before the interrupt
/// sources are programmed so no core can take the NMI and see half of it.
pub struct RedirectConfig {
    transfer_address: AtomicU64,
    context_base: AtomicU64,
    armed: AtomicBool,
}

pub static REDIRECT_CONFIG: RedirectConfig = RedirectConfig::new();

impl RedirectConfig {
    pub const fn new() -> RedirectConfig {
        RedirectConfig {
            transfer_address: AtomicU64::new(0),
            context_base: AtomicU64::new(0),
            armed: AtomicBool::new(false),
        }
    }

    pub fn set_transfer_address(&self, addr: u64) {
        self.transfer_address.store(addr, Ordering::Release);
    }

    pub fn set_context_base(&self, addr: u64) {
        self.context_base.store(addr, Ordering::Release);
    }

    /// Makes earlier stores visible to every core and to the GIC.
    pub fn publish(&self) {
        fence(Ordering::SeqCst);
        arch::dsb_sy();
        arch::isb();
    }

    pub fn mark_armed(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Both addresses, if both are set
    pub fn redirect(&self) -> Option<Redirect> {
        let transfer_address = self.transfer_address.load(Ordering::Acquire);
        let context_base = self.context_base.load(Ordering::Acquire);
        if transfer_address == 0 || context_base == 0 {
            return None;
        }
        Some(Redirect {
            transfer_address,
            context_base,
        })
    }

    pub fn state(&self) -> RedirectState {
        match self.redirect() {
            None => RedirectState::Unconfigured,
            Some(r) if self.armed.load(Ordering::Acquire) => RedirectState::Armed(r),
            Some(r) => RedirectState::Configured(r),
        }
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        RedirectConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let config = RedirectConfig::new();
        assert_eq!(config.state(), RedirectState::Unconfigured);

        config.set_transfer_address(0xffff_8000_1008_0000);
        config.publish();
        assert_eq!(config.state(), RedirectState::Unconfigured);

        config.set_context_base(0x4f00_0000);
        config.publish();
        let redirect = Redirect {
            transfer_address: 0xffff_8000_1008_0000,
            context_base: 0x4f00_0000,
        };
        assert_eq!(config.state(), RedirectState::Configured(redirect));

        config.mark_armed();
        assert_eq!(config.state(), RedirectState::Armed(redirect));
    }
}
