// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// 32-bit register access relative to the mailbox block base
pub trait RegisterBus {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

impl<T: RegisterBus + ?Sized> RegisterBus for &T {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

/// The real mailbox block, mapped as device memory
#[derive(Debug)]
pub struct MmioBus {
    base: usize,
}

impl MmioBus {
    /// # Safety
    ///
    /// `base` must be the mailbox register block, mapped as device memory for
    /// as long as the returned value is used.
    pub const unsafe fn new(base: usize) -> MmioBus {
        MmioBus { base }
    }

    /// The block at `plat_def::IPC_REG_BASE`
    ///
    /// # Safety
    ///
    /// Only valid once the EL3 translation tables map the device region.
    pub const unsafe fn platform() -> MmioBus {
        MmioBus::new(plat_def::IPC_REG_BASE)
    }
}

impl RegisterBus for MmioBus {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: `new` requires the whole block to be mapped
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}
