// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stand-ins for the hardware, for running the NMI path on a host.

use crate::context::{Platform, ScratchMemory};
use crate::gic::{GicTarget, InterruptController};
use crate::NmiError;
use bl31_areas::{ContextSnapshot, InterruptProp, SgiRegister};
use plat_def::{NMI_STACK_SIZE, PLATFORM_CORE_COUNT};
use std::collections::VecDeque;
use zerocopy::AsBytes;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GicEvent {
    Disable { intid: u32, core: usize },
    Configure { target: GicTarget, prop: InterruptProp },
    Sgi(SgiRegister),
    Eoi(u32),
}

/// Records what it's asked to do. Acknowledges interrupts from a queue.
#[derive(Debug, Default)]
pub struct FakeGic {
    pub events: Vec<GicEvent>,
    pub pending: VecDeque<u32>,
    enabled: Vec<(GicTarget, u32)>,
}

impl FakeGic {
    pub fn new() -> FakeGic {
        FakeGic::default()
    }

    pub fn is_enabled(&self, target: GicTarget, intid: u32) -> bool {
        self.enabled.contains(&(target, intid))
    }

    pub fn sgis(&self) -> Vec<SgiRegister> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GicEvent::Sgi(sgi) => Some(*sgi),
                _ => None,
            })
            .collect()
    }
}

impl InterruptController for FakeGic {
    fn disable_interrupt(&mut self, intid: u32, core: usize) {
        let target = GicTarget::for_intid(intid, core);
        self.enabled.retain(|e| *e != (target, intid));
        self.events.push(GicEvent::Disable { intid, core });
    }

    fn configure(&mut self, target: GicTarget, prop: &InterruptProp) {
        if !self.is_enabled(target, prop.intid) {
            self.enabled.push((target, prop.intid));
        }
        self.events.push(GicEvent::Configure {
            target,
            prop: *prop,
        });
    }

    fn raise_sgi(&mut self, sgi: SgiRegister) {
        self.events.push(GicEvent::Sgi(sgi));
    }

    fn acknowledge_group0(&mut self) -> u32 {
        // 1023: nothing pending
        self.pending.pop_front().unwrap_or(1023)
    }

    fn end_of_interrupt_group0(&mut self, intid: u32) {
        self.events.push(GicEvent::Eoi(intid));
    }
}

/// A core with fixed answers
#[derive(Copy, Clone, Debug)]
pub struct FixedCore {
    pub core: usize,
    pub sp_el1: u64,
}

impl Platform for FixedCore {
    fn core_pos(&self) -> usize {
        self.core
    }

    fn sp_el1(&self) -> u64 {
        self.sp_el1
    }
}

/// Snapshot region backed by a byte buffer that claims to live at `base`
#[derive(Debug)]
pub struct ScratchBuffer {
    base: u64,
    bytes: Vec<u8>,
}

impl ScratchBuffer {
    /// Room for every core's slot
    pub fn new(base: u64) -> ScratchBuffer {
        ScratchBuffer {
            base,
            bytes: vec![0; PLATFORM_CORE_COUNT * NMI_STACK_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of `core`'s slot
    pub fn slot(&self, core: usize) -> &[u8] {
        let start = core * NMI_STACK_SIZE;
        &self.bytes[start..start + NMI_STACK_SIZE]
    }
}

impl ScratchMemory for ScratchBuffer {
    fn write_snapshot(&mut self, addr: u64, snapshot: &ContextSnapshot) -> Result<(), NmiError> {
        let dest = addr
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
            .and_then(|start| {
                let end = start.checked_add(ContextSnapshot::SIZE)?;
                self.bytes.get_mut(start..end)
            })
            .ok_or(NmiError::SlotUnavailable { addr })?;
        dest.copy_from_slice(snapshot.as_bytes());
        Ok(())
    }
}
