// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A mailbox block in ordinary memory, for hosted runs and tests.
//!
//! Mirrors what the hardware does with each register: SET and CLEAR take a
//! node number and flip that node's bit in STATUS, the share window is plain
//! storage. All of it is atomic so two threads can stand in for two cores.

use crate::bus::RegisterBus;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use plat_def::{
    IPC_CLEAR_OFFSET, IPC_INT_MASK_OFFSET, IPC_SET_OFFSET, IPC_SHARE_MAX_REG, IPC_SHARE_OFFSET,
    IPC_STATUS_OFFSET,
};

pub struct SimulatedMailbox {
    status: AtomicU32,
    int_mask: AtomicU32,
    window: [AtomicU32; IPC_SHARE_MAX_REG],
    writes: AtomicUsize,
}

impl SimulatedMailbox {
    pub const fn new() -> SimulatedMailbox {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU32 = AtomicU32::new(0);
        SimulatedMailbox {
            status: AtomicU32::new(0),
            int_mask: AtomicU32::new(0),
            window: [ZERO; IPC_SHARE_MAX_REG],
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of register writes seen so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn window_index(offset: usize) -> Option<usize> {
        let index = offset.checked_sub(IPC_SHARE_OFFSET)? / 4;
        (offset % 4 == 0 && index < IPC_SHARE_MAX_REG).then_some(index)
    }
}

impl Default for SimulatedMailbox {
    fn default() -> Self {
        SimulatedMailbox::new()
    }
}

impl RegisterBus for SimulatedMailbox {
    fn read32(&self, offset: usize) -> u32 {
        match offset {
            IPC_STATUS_OFFSET => self.status.load(Ordering::SeqCst),
            IPC_INT_MASK_OFFSET => self.int_mask.load(Ordering::SeqCst),
            _ => Self::window_index(offset)
                .map_or(0, |i| self.window[i].load(Ordering::SeqCst)),
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let bit = 1u32.checked_shl(value).unwrap_or(0);
        match offset {
            IPC_SET_OFFSET => {
                self.status.fetch_or(bit, Ordering::SeqCst);
            }
            IPC_CLEAR_OFFSET => {
                self.status.fetch_and(!bit, Ordering::SeqCst);
            }
            // Read-only on the real block
            IPC_STATUS_OFFSET => {}
            IPC_INT_MASK_OFFSET => self.int_mask.store(value, Ordering::SeqCst),
            _ => {
                if let Some(i) = Self::window_index(offset) {
                    self.window[i].store(value, Ordering::SeqCst);
                }
            }
        }
    }
}
