// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use plat_def::{NMI_STACK_SIZE, PLATFORM_CORE_COUNT};
use serde::Deserialize;
use std::path::Path;

/// How the snapshot region is carved up. Anything left out of the TOML file
/// takes the platform's value.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    /// Number of per-core slots
    pub cores: usize,
    /// Bytes between consecutive slots
    pub stride: usize,
    /// Physical address the region was dumped from; only used for display
    pub base: u64,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            cores: PLATFORM_CORE_COUNT,
            stride: NMI_STACK_SIZE,
            base: 0,
        }
    }
}

impl Layout {
    pub fn load(path: &Path) -> Result<Layout> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read layout {}", path.display()))?;
        let layout: Layout = toml::from_str(&contents)
            .with_context(|| format!("could not parse layout {}", path.display()))?;
        layout.check()?;
        Ok(layout)
    }

    fn check(&self) -> Result<()> {
        if self.cores == 0 {
            bail!("layout has no cores");
        }
        let end = self
            .cores
            .checked_mul(self.stride)
            .and_then(|len| u64::try_from(len).ok())
            .and_then(|len| self.base.checked_add(len));
        if end.is_none() {
            bail!(
                "{} slots of {:#x} bytes from {:#x} run past the end of memory",
                self.cores,
                self.stride,
                self.base
            );
        }
        if self.stride < bl31_areas::ContextSnapshot::SIZE {
            bail!(
                "slot stride {:#x} is smaller than a snapshot ({:#x} bytes)",
                self.stride,
                bl31_areas::ContextSnapshot::SIZE
            );
        }
        Ok(())
    }

    /// Byte offset of `core`'s slot in the dump; `None` if it doesn't fit
    pub fn slot_offset(&self, core: usize) -> Option<usize> {
        core.checked_mul(self.stride)
    }

    pub fn slot_address(&self, core: usize) -> Option<u64> {
        let offset = u64::try_from(self.slot_offset(core)?).ok()?;
        self.base.checked_add(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_platform_defaults() {
        let layout: Layout = toml::from_str("base = 0x4f000000\n").unwrap();
        assert_eq!(layout.cores, 2);
        assert_eq!(layout.stride, 0x200);
        assert_eq!(layout.slot_address(1), Some(0x4f00_0200));
    }

    #[test]
    fn stride_must_fit_a_snapshot() {
        let layout: Layout = toml::from_str("stride = 0x100\n").unwrap();
        assert!(layout.check().is_err());
    }

    #[test]
    fn region_must_fit_in_the_address_space() {
        let layout: Layout = toml::from_str("cores = 5\nstride = 0x4000000000000000\n").unwrap();
        assert!(layout.check().is_err());
        assert_eq!(layout.slot_offset(4), None);
        assert_eq!(layout.slot_address(4), None);

        let layout = Layout {
            base: 0xffff_ffff_ffff_fe00,
            ..Layout::default()
        };
        assert!(layout.check().is_err());
        assert_eq!(layout.slot_address(0), Some(0xffff_ffff_ffff_fe00));
        assert_eq!(layout.slot_address(1), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Layout>("core = 4\n").is_err());
    }
}
