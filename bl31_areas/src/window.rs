// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_derive::FromPrimitive;
use plat_def::{
    IPC_CMD_ACK, IPC_CMD_NEED_BL31, IPC_CMD_NEED_KERNEL, IPC_CMD_NEED_TEEIMG, IPC_CMD_START_BL31,
    IPC_CMD_START_KERNEL, IPC_CMD_START_TEEIMG, IPC_SHARE_MAX_REG, IPC_SHARE_OFFSET,
};
use strum_macros::{Display, EnumString};

/// Number of payload words a message can carry.
///
/// The window is `IPC_SHARE_MAX_REG` words; command, length and checksum take
/// one each.
pub const DATA_CAPACITY: usize = IPC_SHARE_MAX_REG - 3;

/// A word in the shared message window
///
/// ```text
/// | REG[0] | REG[1] | REG[2..n-2] | REG[n-1] |
/// |  cmd   |  len   |   payload   | checksum |
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShareSlot {
    Command,
    Length,
    /// Payload word `i`, `i < DATA_CAPACITY`
    Data(usize),
    Checksum,
}

impl ShareSlot {
    /// Word index inside the window
    pub const fn index(self) -> usize {
        match self {
            ShareSlot::Command => 0,
            ShareSlot::Length => 1,
            ShareSlot::Data(i) => 2 + i,
            ShareSlot::Checksum => IPC_SHARE_MAX_REG - 1,
        }
    }

    /// Byte offset from the mailbox block base.
    ///
    /// Returns `None` for a payload index past the window; the checksum word
    /// is never addressable as payload.
    pub const fn offset(self) -> Option<usize> {
        if let ShareSlot::Data(i) = self {
            if i >= DATA_CAPACITY {
                return None;
            }
        }
        Some(IPC_SHARE_OFFSET + self.index() * 4)
    }
}

/// Opcodes carried in the command word
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum IpcCommand {
    Ack = IPC_CMD_ACK,
    StartBl31 = IPC_CMD_START_BL31,
    StartTeeimg = IPC_CMD_START_TEEIMG,
    StartKernel = IPC_CMD_START_KERNEL,
    NeedBl31 = IPC_CMD_NEED_BL31,
    NeedTeeimg = IPC_CMD_NEED_TEEIMG,
    NeedKernel = IPC_CMD_NEED_KERNEL,
}
