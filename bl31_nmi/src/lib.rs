// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secure watchdog NMI handling at EL3.
//!
//! Once the OS has told us (over a private SMC) where its NMI handler lives
//! and where to leave register dumps, a watchdog interrupt on any core is
//! turned into an exception return into that handler, with the interrupted
//! registers captured in the core's scratch slot. The core that took the
//! watchdog pokes the others with a group 0 SGI so they do the same.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod arch;
pub mod config;
pub mod context;
#[cfg(any(test, feature = "std"))]
pub mod fake;
pub mod gic;
pub mod service;

pub use config::{Redirect, RedirectConfig, RedirectState, REDIRECT_CONFIG};
pub use context::{CpuContext, Platform, SavedContext, ScratchMemory};
pub use gic::{GicTarget, Gicv3, InterruptController};
pub use service::NmiService;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NmiError {
    /// Redirect is configured but the interrupted context wasn't handed to
    /// us, so there is nothing to capture or rewrite.
    #[error("no saved context for the interrupted world")]
    MissingContext,

    /// The OS gave us a context base whose slot for this core doesn't land in
    /// memory we can write.
    #[error("snapshot slot at {addr:#x} is not writable")]
    SlotUnavailable { addr: u64 },
}

impl NmiError {
    /// Status returned to the runtime's interrupt framework
    pub fn status_code(&self) -> u64 {
        plat_def::TF_ERROR
    }
}
