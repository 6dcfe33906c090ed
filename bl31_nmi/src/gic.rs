// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::arch;
use bl31_areas::{InterruptGroup, InterruptProp, SgiRegister, Trigger};
use plat_def::{GICD_BASE, GICR_BASE, GICR_STRIDE};

// Distributor registers. The redistributor's SGI frame uses the same offsets
// for its one word of SGI/PPI state.
const GICD_CTLR: usize = 0x0000;
const GICD_IGROUPR: usize = 0x0080;
const GICD_ISENABLER: usize = 0x0100;
const GICD_ICENABLER: usize = 0x0180;
const GICD_IPRIORITYR: usize = 0x0400;
const GICD_ICFGR: usize = 0x0C00;
const GICD_IGRPMODR: usize = 0x0D00;
const GICD_CTLR_RWP: u32 = 1 << 31;

const GICR_CTLR: usize = 0x0000;
const GICR_CTLR_RWP: u32 = 1 << 3;
const GICR_SGI_FRAME: usize = 0x1_0000;

/// Which block an interrupt's configuration lives in
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GicTarget {
    /// SPIs
    Distributor,
    /// SGIs and PPIs of one core
    Redistributor(usize),
}

impl GicTarget {
    /// SGIs and PPIs are banked per core; everything else is shared.
    pub fn for_intid(intid: u32, core: usize) -> GicTarget {
        if intid < 32 {
            GicTarget::Redistributor(core)
        } else {
            GicTarget::Distributor
        }
    }
}

/// The operations the NMI path needs from the interrupt controller
pub trait InterruptController {
    /// Stops `intid` being forwarded. Disabling a disabled interrupt is a
    /// no-op.
    fn disable_interrupt(&mut self, intid: u32, core: usize);

    /// Programs group, trigger and priority, then enables.
    fn configure(&mut self, target: GicTarget, prop: &InterruptProp);

    fn raise_sgi(&mut self, sgi: SgiRegister);

    /// Reads IAR0, activating the highest priority pending group 0 interrupt.
    fn acknowledge_group0(&mut self) -> u32;

    fn end_of_interrupt_group0(&mut self, intid: u32);
}

struct Frame {
    regs: usize,
    ctlr: usize,
    rwp: u32,
}

/// GICv3 driven through its memory-mapped distributor and redistributors and
/// the group 0 CPU interface registers.
#[derive(Debug)]
pub struct Gicv3 {
    gicd: usize,
    gicr: usize,
}

impl Gicv3 {
    /// # Safety
    ///
    /// `gicd` and `gicr` must be the distributor and the first redistributor,
    /// mapped as device memory, with redistributors `GICR_STRIDE` apart.
    pub const unsafe fn new(gicd: usize, gicr: usize) -> Gicv3 {
        Gicv3 { gicd, gicr }
    }

    /// # Safety
    ///
    /// See `new`; the platform's GIC must already be mapped.
    pub const unsafe fn platform() -> Gicv3 {
        Gicv3::new(GICD_BASE, GICR_BASE)
    }

    fn frame(&self, target: GicTarget) -> Frame {
        match target {
            GicTarget::Distributor => Frame {
                regs: self.gicd,
                ctlr: self.gicd + GICD_CTLR,
                rwp: GICD_CTLR_RWP,
            },
            GicTarget::Redistributor(core) => {
                let rd = self.gicr + core * GICR_STRIDE;
                Frame {
                    regs: rd + GICR_SGI_FRAME,
                    ctlr: rd + GICR_CTLR,
                    rwp: GICR_CTLR_RWP,
                }
            }
        }
    }

    fn read32(addr: usize) -> u32 {
        // SAFETY: every address is derived from the bases `new` vouches for
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn write32(addr: usize, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }

    fn write8(addr: usize, value: u8) {
        // SAFETY: as above; the priority registers are byte accessible
        unsafe { core::ptr::write_volatile(addr as *mut u8, value) }
    }

    fn update_bit(addr: usize, bit: u32, set: bool) {
        let value = Self::read32(addr);
        let value = if set {
            value | (1 << bit)
        } else {
            value & !(1 << bit)
        };
        Self::write32(addr, value);
    }

    fn wait_for_rwp(frame: &Frame) {
        while Self::read32(frame.ctlr) & frame.rwp != 0 {
            core::hint::spin_loop();
        }
    }
}

/// Byte offset of the word holding `intid`'s bit, and the bit within it
fn bit_position(intid: u32) -> (usize, u32) {
    ((intid / 32) as usize * 4, intid % 32)
}

impl InterruptController for Gicv3 {
    fn disable_interrupt(&mut self, intid: u32, core: usize) {
        let frame = self.frame(GicTarget::for_intid(intid, core));
        let (word, bit) = bit_position(intid);

        Self::write32(frame.regs + GICD_ICENABLER + word, 1 << bit);
        Self::wait_for_rwp(&frame);
        arch::dsb_ishst();
    }

    fn configure(&mut self, target: GicTarget, prop: &InterruptProp) {
        let frame = self.frame(target);
        let (word, bit) = bit_position(prop.intid);

        let (group, modifier) = match prop.group {
            InterruptGroup::Group0 => (false, false),
            InterruptGroup::Group1Secure => (false, true),
            InterruptGroup::Group1NonSecure => (true, false),
        };
        Self::update_bit(frame.regs + GICD_IGROUPR + word, bit, group);
        Self::update_bit(frame.regs + GICD_IGRPMODR + word, bit, modifier);

        // Two bits per interrupt; the upper one selects edge
        let cfg_word = (prop.intid / 16) as usize * 4;
        let cfg_bit = (prop.intid % 16) * 2 + 1;
        Self::update_bit(
            frame.regs + GICD_ICFGR + cfg_word,
            cfg_bit,
            prop.trigger == Trigger::Edge,
        );

        Self::write8(
            frame.regs + GICD_IPRIORITYR + prop.intid as usize,
            prop.priority,
        );
        Self::write32(frame.regs + GICD_ISENABLER + word, 1 << bit);
    }

    fn raise_sgi(&mut self, sgi: SgiRegister) {
        arch::write_icc_sgi0r_el1(sgi.bits());
    }

    fn acknowledge_group0(&mut self) -> u32 {
        arch::read_icc_iar0_el1()
    }

    fn end_of_interrupt_group0(&mut self, intid: u32) {
        arch::write_icc_eoir0_el1(intid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl31_areas::SecureInterrupt;

    /// Plain memory standing in for the distributor and two redistributors
    struct Regs {
        gicd: Vec<u32>,
        gicr: Vec<u32>,
    }

    impl Regs {
        fn new() -> Regs {
            Regs {
                gicd: vec![0; 0x1000],
                gicr: vec![0; 2 * GICR_STRIDE / 4],
            }
        }

        fn gic(&mut self) -> Gicv3 {
            // SAFETY: both buffers outlive the returned value in every test
            unsafe { Gicv3::new(self.gicd.as_mut_ptr() as usize, self.gicr.as_mut_ptr() as usize) }
        }

        fn gicd(&self, offset: usize) -> u32 {
            self.gicd[offset / 4]
        }

        fn sgi_frame(&self, core: usize, offset: usize) -> u32 {
            self.gicr[(core * GICR_STRIDE + GICR_SGI_FRAME + offset) / 4]
        }
    }

    #[test]
    fn watchdog_spi_configured_at_the_distributor() {
        let mut regs = Regs::new();
        // Start from group 1, edge, lowest priority
        regs.gicd[(GICD_IGROUPR + 4) / 4] = !0;
        regs.gicd[(GICD_ICFGR + 8) / 4] = !0;
        regs.gicd[(GICD_IPRIORITYR + 32) / 4] = !0;

        let mut gic = regs.gic();
        gic.configure(
            GicTarget::Distributor,
            &SecureInterrupt::Watchdog.prop(),
        );

        // intid 35: word 1, bit 3
        assert_eq!(regs.gicd(GICD_IGROUPR + 4), !(1 << 3));
        assert_eq!(regs.gicd(GICD_IGRPMODR + 4), 0);
        // ICFGR word 2, field 3, edge bit 7
        assert_eq!(regs.gicd(GICD_ICFGR + 8), !(1 << 7));
        // priority byte 35 is the top byte of the word at 32
        assert_eq!(regs.gicd(GICD_IPRIORITYR + 32), 0x00ff_ffff);
        assert_eq!(regs.gicd(GICD_ISENABLER + 4), 1 << 3);
    }

    #[test]
    fn sibling_sgi_configured_per_core() {
        let mut regs = Regs::new();
        let mut gic = regs.gic();
        gic.configure(
            GicTarget::Redistributor(1),
            &SecureInterrupt::SiblingSgi.prop(),
        );

        assert_eq!(regs.sgi_frame(1, GICD_ISENABLER), 1 << 14);
        assert_eq!(regs.sgi_frame(0, GICD_ISENABLER), 0);
    }

    #[test]
    fn disable_targets_the_right_block() {
        let mut regs = Regs::new();
        let mut gic = regs.gic();
        gic.disable_interrupt(35, 0);
        gic.disable_interrupt(35, 0);
        gic.disable_interrupt(14, 1);

        assert_eq!(regs.gicd(GICD_ICENABLER + 4), 1 << 3);
        assert_eq!(regs.sgi_frame(1, GICD_ICENABLER), 1 << 14);
        assert_eq!(regs.sgi_frame(0, GICD_ICENABLER), 0);
    }

    #[test]
    fn target_for_intid() {
        assert_eq!(GicTarget::for_intid(14, 1), GicTarget::Redistributor(1));
        assert_eq!(GicTarget::for_intid(31, 0), GicTarget::Redistributor(0));
        assert_eq!(GicTarget::for_intid(35, 1), GicTarget::Distributor);
    }
}
