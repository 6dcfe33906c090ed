// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::{Redirect, RedirectConfig};
use crate::context::{Platform, SavedContext, ScratchMemory};
use crate::gic::{GicTarget, InterruptController};
use crate::{arch, NmiError};
use bl31_areas::{ContextSnapshot, SecureInterrupt, SgiRegister, Spsr};
use log::{error, info, warn};
use num_traits::FromPrimitive;
use plat_def::{
    FIQ_SGI_S, GP_NUM, NMI_STACK_SIZE, PLATFORM_CORE_COUNT, PRIVATE_NMI_SMC_FIQ_GLUE_ID, SMC_UNK,
};

/// Everything the EL3 NMI path talks to
pub struct NmiService<'a, G, P, M> {
    gic: G,
    platform: P,
    memory: M,
    config: &'a RedirectConfig,
}

impl<'a, G, P, M> NmiService<'a, G, P, M>
where
    G: InterruptController,
    P: Platform,
    M: ScratchMemory,
{
    pub fn new(gic: G, platform: P, memory: M, config: &'a RedirectConfig) -> Self {
        NmiService {
            gic,
            platform,
            memory,
            config,
        }
    }

    pub fn gic(&self) -> &G {
        &self.gic
    }

    pub fn gic_mut(&mut self) -> &mut G {
        &mut self.gic
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn config(&self) -> &RedirectConfig {
        self.config
    }

    /// Fast SMC from the OS: `x1` is its NMI entry point, `x2` the base of
    /// the per-core snapshot slots. Returns `x0`.
    ///
    /// A zero argument leaves that setting as it was. Every successful call
    /// reprograms the watchdog and the sibling SGI as group 0.
    pub fn handle_smc(&mut self, fid: u32, x1: u64, x2: u64) -> u64 {
        if fid != PRIVATE_NMI_SMC_FIQ_GLUE_ID {
            warn!("unimplemented private SMC call {:#x}", fid);
            return SMC_UNK;
        }
        info!("private SMC call {:#x}", fid);

        if x1 != 0 {
            self.config.set_transfer_address(x1);
        } else {
            info!("NMI transfer address is NULL");
        }
        if x2 != 0 {
            self.config.set_context_base(x2);
        } else {
            info!("NMI context address is NULL");
        }
        self.config.publish();

        self.arm();
        x1
    }

    fn arm(&mut self) {
        let watchdog = SecureInterrupt::Watchdog.prop();
        self.gic.configure(GicTarget::Distributor, &watchdog);

        let sgi = SecureInterrupt::SiblingSgi.prop();
        for core in 0..PLATFORM_CORE_COUNT {
            self.gic.configure(GicTarget::Redistributor(core), &sgi);
        }

        arch::dsb_sy();
        arch::isb();
        self.config.mark_armed();
    }

    /// Group 0 interrupt entry. Always ends the interrupt it acknowledged and
    /// returns 0, whatever the handler made of it.
    pub fn el3_interrupt_handler(&mut self, ctx: Option<&mut dyn SavedContext>) -> u64 {
        let id = self.gic.acknowledge_group0();

        match SecureInterrupt::from_u32(id) {
            Some(SecureInterrupt::Watchdog) | Some(SecureInterrupt::SiblingSgi) => {
                if let Err(e) = self.nmi_exception_handler(id, ctx) {
                    error!("NMI {} not redirected: {}", id, e);
                }
            }
            None => error!("no handler for group 0 interrupt {}", id),
        }

        self.gic.end_of_interrupt_group0(id);
        arch::dsb_sy();
        0
    }

    /// Quiets the watchdog, and if the OS asked for it, captures the
    /// interrupted context and rewrites it to return into the OS's handler.
    /// The core that took the watchdog then forwards it to the others.
    pub fn nmi_exception_handler(
        &mut self,
        id: u32,
        ctx: Option<&mut dyn SavedContext>,
    ) -> Result<(), NmiError> {
        let core = self.platform.core_pos();
        let source = SecureInterrupt::from_u32(id);

        if source == Some(SecureInterrupt::Watchdog) {
            self.gic.disable_interrupt(id, core);
        }
        arch::dsb_sy();
        arch::isb();

        if let Some(redirect) = self.config.redirect() {
            let ctx = ctx.ok_or_else(|| {
                error!("NMI {} on core {} arrived without a saved context", id, core);
                NmiError::MissingContext
            })?;
            self.redirect(core, id, redirect, ctx)?;
        }

        if source == Some(SecureInterrupt::Watchdog) {
            // Anything the other cores read on the way in must be out first
            arch::dsb_ishst();
            self.gic.raise_sgi(SgiRegister::to_others(FIQ_SGI_S as u8));
            arch::isb();
        }
        arch::dsb_sy();
        arch::isb();

        Ok(())
    }

    fn redirect(
        &mut self,
        core: usize,
        id: u32,
        redirect: Redirect,
        ctx: &mut dyn SavedContext,
    ) -> Result<(), NmiError> {
        let mut gpregs = [0u64; GP_NUM];
        for (n, reg) in gpregs.iter_mut().enumerate() {
            *reg = ctx.gpreg(n);
        }
        let snapshot = ContextSnapshot::capture(
            &gpregs,
            self.platform.sp_el1(),
            ctx.elr_el3(),
            ctx.spsr_el3(),
            u64::from(id),
        );

        let slot = (core as u64)
            .checked_mul(NMI_STACK_SIZE as u64)
            .and_then(|offset| redirect.context_base.checked_add(offset))
            .ok_or(NmiError::SlotUnavailable {
                addr: redirect.context_base,
            })?;
        self.memory.write_snapshot(slot, &snapshot)?;

        ctx.set_elr_el3(redirect.transfer_address);

        // EL0 has no business running the handler; go back to EL1 on SP_EL1
        // instead. Whatever the level, D, I and F stay masked until the OS
        // handler unmasks them. SError is left alone.
        let mut spsr = Spsr::from(ctx.spsr_el3());
        if spsr.is_el0t() {
            spsr.set_el(1);
            spsr.set_sp_sel(true);
        }
        spsr.set_debug_masked(true);
        spsr.set_irq_masked(true);
        spsr.set_fiq_masked(true);
        ctx.set_spsr_el3(spsr.bits());

        Ok(())
    }
}
