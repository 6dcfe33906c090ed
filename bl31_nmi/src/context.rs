// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{arch, NmiError};
use bl31_areas::ContextSnapshot;
use byteorder::{ByteOrder, LittleEndian};
use plat_def::{PLATFORM_CORE_COUNT, PLATFORM_MAX_CPUS_PER_CLUSTER};
use zerocopy::AsBytes;

/// The lower-EL state EL3 saved on exception entry and restores on `eret`
pub trait SavedContext {
    /// General purpose register `n`, `n <= 30`
    fn gpreg(&self, n: usize) -> u64;
    fn elr_el3(&self) -> u64;
    fn set_elr_el3(&mut self, value: u64);
    fn spsr_el3(&self) -> u64;
    fn set_spsr_el3(&mut self, value: u64);
}

/// Per-core facts the NMI path reads from the running PE
pub trait Platform {
    /// Linear index of the calling core, `< PLATFORM_CORE_COUNT`
    fn core_pos(&self) -> usize;
    /// SP_EL1 isn't part of the saved context; it's still live in the
    /// register when EL3 runs.
    fn sp_el1(&self) -> u64;
}

/// Where snapshots end up: memory the OS nominated, addressed physically
pub trait ScratchMemory {
    fn write_snapshot(&mut self, addr: u64, snapshot: &ContextSnapshot) -> Result<(), NmiError>;
}

#[derive(Clone, Debug, Default)]
#[repr(C, align(16))]
pub struct GpRegs {
    /// x0..x30, then SP_EL0
    pub registers: [u64; 32],
}

/// Registers EL3 keeps on exception entry, in the runtime's context layout.
#[derive(Clone, Debug, Default)]
#[repr(C, align(16))]
pub struct El3State {
    pub scr_el3: u64,
    pub esr_el3: u64,
    pub runtime_sp: u64,
    pub spsr_el3: u64,
    pub elr_el3: u64,
    _padding: u64,
}

/// The state of a core at the next lower EL
#[derive(Clone, Debug, Default)]
#[repr(C)]
pub struct CpuContext {
    pub gpregs: GpRegs,
    pub el3_state: El3State,
}

impl SavedContext for CpuContext {
    fn gpreg(&self, n: usize) -> u64 {
        self.gpregs.registers[n]
    }

    fn elr_el3(&self) -> u64 {
        self.el3_state.elr_el3
    }

    fn set_elr_el3(&mut self, value: u64) {
        self.el3_state.elr_el3 = value;
    }

    fn spsr_el3(&self) -> u64 {
        self.el3_state.spsr_el3
    }

    fn set_spsr_el3(&mut self, value: u64) {
        self.el3_state.spsr_el3 = value;
    }
}

/// The core we're running on
pub struct CurrentCore;

/// Affinity 0 is the core within a cluster, affinity 1 the cluster.
pub fn plat_calc_core_pos(mpidr: u64) -> usize {
    let aff0 = (mpidr & 0xff) as usize;
    let aff1 = ((mpidr >> 8) & 0xff) as usize;
    aff1 * PLATFORM_MAX_CPUS_PER_CLUSTER + aff0
}

impl Platform for CurrentCore {
    fn core_pos(&self) -> usize {
        plat_calc_core_pos(arch::read_mpidr_el1())
    }

    fn sp_el1(&self) -> u64 {
        arch::read_sp_el1()
    }
}

/// Physical memory, written word by word with volatile stores
pub struct PhysicalScratch {
    limit: u64,
}

impl PhysicalScratch {
    /// # Safety
    ///
    /// Every address below `limit` that the OS can name as a context base must
    /// be mapped writable at EL3, for `PLATFORM_CORE_COUNT` slots.
    pub const unsafe fn new(limit: u64) -> PhysicalScratch {
        PhysicalScratch { limit }
    }
}

impl ScratchMemory for PhysicalScratch {
    fn write_snapshot(&mut self, addr: u64, snapshot: &ContextSnapshot) -> Result<(), NmiError> {
        let end = addr.checked_add(ContextSnapshot::SIZE as u64);
        if addr % 8 != 0 || end.map_or(true, |end| end > self.limit) {
            return Err(NmiError::SlotUnavailable { addr });
        }

        let mut slot = addr as *mut u64;
        for word in snapshot.as_bytes().chunks_exact(8) {
            // SAFETY: in range and aligned per the checks above and `new`
            unsafe {
                core::ptr::write_volatile(slot, LittleEndian::read_u64(word));
                slot = slot.add(1);
            }
        }
        Ok(())
    }
}

const _: () = assert!(PLATFORM_CORE_COUNT <= PLATFORM_MAX_CPUS_PER_CLUSTER);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_pos_from_mpidr() {
        assert_eq!(plat_calc_core_pos(0x8000_0000), 0);
        assert_eq!(plat_calc_core_pos(0x8000_0001), 1);
        assert_eq!(plat_calc_core_pos(0x8000_0101), 3);
    }

    #[test]
    fn context_accessors() {
        let mut ctx = CpuContext::default();
        ctx.gpregs.registers[30] = 0x4008_1000;
        ctx.set_elr_el3(0xffff_8000_1000_0000);
        ctx.set_spsr_el3(0x3c5);
        assert_eq!(ctx.gpreg(30), 0x4008_1000);
        assert_eq!(ctx.el3_state.elr_el3, 0xffff_8000_1000_0000);
        assert_eq!(ctx.spsr_el3(), 0x3c5);
    }

    #[test]
    fn physical_scratch_writes_the_record() {
        let mut memory = vec![0u64; ContextSnapshot::SIZE / 8];
        let base = memory.as_mut_ptr() as u64;
        let snap = ContextSnapshot::capture(&[7; 31], 1, 2, 3, 35);

        // SAFETY: only `memory` is ever written
        let mut scratch = unsafe { PhysicalScratch::new(base + ContextSnapshot::SIZE as u64) };
        scratch.write_snapshot(base, &snap).unwrap();
        assert_eq!(memory[0], 7);
        assert_eq!(memory[36], 35);
        assert_eq!(memory[37], snap.checksum.get());

        assert_eq!(
            scratch.write_snapshot(base + 8, &snap),
            Err(NmiError::SlotUnavailable { addr: base + 8 })
        );
    }
}
