// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitfield::bitfield;
use num_derive::FromPrimitive;
use plat_def::{FIQ_SGI_S, GIC_HIGHEST_SEC_PRIORITY, PERI_WDT5_S};

bitfield! {
    /// SPSR_EL3 as saved on exception entry, AArch64 layout
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Spsr(u64);
    impl Debug;
    /// M[0]: 0 = SP_EL0, 1 = SP_ELx
    pub sp_sel, set_sp_sel: 0;
    /// M[3:2]
    pub u8, el, set_el: 3, 2;
    /// M[3:0], exception level and stack selection together
    pub u8, mode, set_mode: 3, 0;
    /// nRW: set for an AArch32 context
    pub aarch32, set_aarch32: 4;
    pub fiq_masked, set_fiq_masked: 6;
    pub irq_masked, set_irq_masked: 7;
    pub serror_masked, set_serror_masked: 8;
    pub debug_masked, set_debug_masked: 9;
}

impl From<u64> for Spsr {
    fn from(bits: u64) -> Spsr {
        Spsr(bits)
    }
}

impl Spsr {
    /// EL1 using SP_EL1 with D, A, I and F all masked.
    pub fn el1h_all_masked() -> Spsr {
        let mut spsr = Spsr(0);
        spsr.set_el(1);
        spsr.set_sp_sel(true);
        spsr.set_debug_masked(true);
        spsr.set_serror_masked(true);
        spsr.set_irq_masked(true);
        spsr.set_fiq_masked(true);
        spsr
    }

    /// True for EL0 running on SP_EL0, the only mode EL0 has
    pub fn is_el0t(&self) -> bool {
        self.mode() == 0
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

bitfield! {
    /// ICC_SGI0R_EL1 / ICC_SGI1R_EL1 value
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SgiRegister(u64);
    impl Debug;
    pub u16, target_list, set_target_list: 15, 0;
    pub u8, aff1, set_aff1: 23, 16;
    pub u8, intid, set_intid: 27, 24;
    pub u8, aff2, set_aff2: 39, 32;
    /// Interrupt routing mode: 1 = every PE except this one
    pub irm, set_irm: 40;
    pub u8, rs, set_rs: 47, 44;
    pub u8, aff3, set_aff3: 55, 48;
}

impl SgiRegister {
    /// SGI `intid` to every PE but the sender. Affinity and target list are
    /// ignored when IRM is set, so they stay zero.
    pub fn to_others(intid: u8) -> SgiRegister {
        let mut sgi = SgiRegister(0);
        sgi.set_intid(intid);
        sgi.set_irm(true);
        sgi
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterruptGroup {
    Group0,
    Group1Secure,
    Group1NonSecure,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Level,
    Edge,
}

/// How an interrupt is programmed at the distributor or redistributor
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterruptProp {
    pub intid: u32,
    pub priority: u8,
    pub group: InterruptGroup,
    pub trigger: Trigger,
}

/// Group 0 interrupts owned by EL3. Both feed the NMI path.
pub const G0_INTERRUPT_PROPS: [InterruptProp; 2] = [
    InterruptProp {
        intid: PERI_WDT5_S,
        priority: GIC_HIGHEST_SEC_PRIORITY,
        group: InterruptGroup::Group0,
        trigger: Trigger::Level,
    },
    InterruptProp {
        intid: FIQ_SGI_S,
        priority: GIC_HIGHEST_SEC_PRIORITY,
        group: InterruptGroup::Group0,
        trigger: Trigger::Level,
    },
];

/// Group 0 interrupt ids EL3 knows how to handle
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum SecureInterrupt {
    /// The secure watchdog firing on the core that owns it
    Watchdog = PERI_WDT5_S,
    /// Another core forwarding its watchdog NMI to this one
    SiblingSgi = FIQ_SGI_S,
}

impl SecureInterrupt {
    pub fn intid(self) -> u32 {
        self as u32
    }

    pub fn prop(self) -> InterruptProp {
        match self {
            SecureInterrupt::Watchdog => G0_INTERRUPT_PROPS[0],
            SecureInterrupt::SiblingSgi => G0_INTERRUPT_PROPS[1],
        }
    }
}
