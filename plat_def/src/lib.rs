// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//! Platform constants for the EL3 runtime firmware
//!
//! The mailbox block, the secure watchdog and the GIC map are fixed by the
//! SoC; everything in here is shared between the firmware crates and the host
//! tools that decode what the firmware leaves behind in memory.
//!
//! Only two cores in one cluster are ever brought up, and the boot handoff is
//! always CORE1 (the coordinating core) feeding CORE0.
#![no_std]

/// Number of cores that run the EL3 runtime
pub const PLATFORM_CORE_COUNT: usize = 2;
pub const PLATFORM_MAX_CPUS_PER_CLUSTER: usize = 2;

/// Base of the inter-core mailbox register block
pub const IPC_REG_BASE: usize = 0x1103_E000;

/// Writing a node number here raises that node's pending flag
pub const IPC_SET_OFFSET: usize = 0x000;
/// Writing a node number here clears that node's pending flag
pub const IPC_CLEAR_OFFSET: usize = 0x004;
/// One pending bit per node, `1 << node`
pub const IPC_STATUS_OFFSET: usize = 0x008;
pub const IPC_INT_MASK_OFFSET: usize = 0x00C;
/// Start of the shared message window
pub const IPC_SHARE_OFFSET: usize = 0x020;

/// Number of 32-bit words in the shared message window
pub const IPC_SHARE_MAX_REG: usize = 16;

/// Number of mailbox nodes; valid nodes are `0..IPC_INT_MAX`
pub const IPC_INT_MAX: u32 = 9;

pub const IPC_NODE_CORE0: u32 = 0;
pub const IPC_NODE_CORE1: u32 = 1;

pub const IPC_CMD_ACK: u32 = 0xA0;
pub const IPC_CMD_START_BL31: u32 = 0xA1;
pub const IPC_CMD_START_TEEIMG: u32 = 0xA2;
pub const IPC_CMD_START_KERNEL: u32 = 0xA3;
pub const IPC_CMD_NEED_BL31: u32 = 0xB1;
pub const IPC_CMD_NEED_TEEIMG: u32 = 0xB2;
pub const IPC_CMD_NEED_KERNEL: u32 = 0xB3;

/// Secure watchdog, wired as a group 0 SPI and used as the NMI source
pub const PERI_WDT5_S: u32 = 35;

/// SGI used to pull the other cores into the NMI path
pub const FIQ_SGI_S: u32 = 14;

pub const GICD_BASE: usize = 0x1240_0000;
pub const GICR_BASE: usize = 0x1244_0000;
/// Distance between two cores' redistributor frames
pub const GICR_STRIDE: usize = 0x2_0000;

/// Highest priority a secure interrupt can be given
pub const GIC_HIGHEST_SEC_PRIORITY: u8 = 0x00;

/// Number of general purpose registers captured from the interrupted context
pub const GP_NUM: usize = 31;

/// Distance between two cores' context snapshot slots
pub const NMI_STACK_SIZE: usize = 0x200;

/// SiP/OEM fast call that hands the NMI redirect target and snapshot base to
/// EL3
pub const PRIVATE_NMI_SMC_FIQ_GLUE_ID: u32 = 0x8300_0004;

/// Returned in x0 for a function id nobody owns
pub const SMC_UNK: u64 = 0xffff_ffff;

/// Status the interrupt path hands back to the dispatcher
pub const TF_OK: u64 = 0;
pub const TF_ERROR: u64 = 0xffff_ffff;
