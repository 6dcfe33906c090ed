// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Barriers and the handful of system registers the NMI path touches.
//!
//! On anything but bare-metal AArch64 these fall back to compiler/CPU fences
//! and inert register accessors so the logic above them runs on a host.

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod imp {
    use core::arch::asm;

    #[inline]
    pub fn dsb_sy() {
        // SAFETY: barrier only
        unsafe { asm!("dsb sy", options(nostack, preserves_flags)) }
    }

    #[inline]
    pub fn dsb_ishst() {
        // SAFETY: barrier only
        unsafe { asm!("dsb ishst", options(nostack, preserves_flags)) }
    }

    #[inline]
    pub fn isb() {
        // SAFETY: barrier only
        unsafe { asm!("isb", options(nostack, preserves_flags)) }
    }

    pub fn read_mpidr_el1() -> u64 {
        let value: u64;
        // SAFETY: read-only system register
        unsafe { asm!("mrs {}, mpidr_el1", out(reg) value, options(nomem, nostack)) }
        value
    }

    pub fn read_sp_el1() -> u64 {
        let value: u64;
        // SAFETY: readable from EL3
        unsafe { asm!("mrs {}, sp_el1", out(reg) value, options(nomem, nostack)) }
        value
    }

    pub fn read_icc_iar0_el1() -> u32 {
        let value: u64;
        // SAFETY: acknowledges the highest priority pending group 0
        // interrupt; callers must follow up with an EOI.
        unsafe { asm!("mrs {}, icc_iar0_el1", out(reg) value, options(nostack)) }
        value as u32
    }

    pub fn write_icc_eoir0_el1(intid: u32) {
        // SAFETY: ends an interrupt previously acknowledged on this PE
        unsafe { asm!("msr icc_eoir0_el1, {}", in(reg) u64::from(intid), options(nostack)) }
    }

    pub fn write_icc_sgi0r_el1(value: u64) {
        // SAFETY: generates a group 0 SGI; no memory is touched
        unsafe { asm!("msr icc_sgi0r_el1, {}", in(reg) value, options(nostack)) }
    }
}

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
mod imp {
    use core::sync::atomic::{fence, Ordering};

    /// Special id the CPU interface returns when nothing is pending
    const INTID_SPURIOUS: u32 = 1023;

    #[inline]
    pub fn dsb_sy() {
        fence(Ordering::SeqCst);
    }

    #[inline]
    pub fn dsb_ishst() {
        fence(Ordering::Release);
    }

    #[inline]
    pub fn isb() {
        fence(Ordering::SeqCst);
    }

    pub fn read_mpidr_el1() -> u64 {
        0
    }

    pub fn read_sp_el1() -> u64 {
        0
    }

    pub fn read_icc_iar0_el1() -> u32 {
        INTID_SPURIOUS
    }

    pub fn write_icc_eoir0_el1(_intid: u32) {}

    pub fn write_icc_sgi0r_el1(_value: u64) {}
}

pub use imp::*;
