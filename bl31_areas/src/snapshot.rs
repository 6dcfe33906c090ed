// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use byteorder::LittleEndian;
use plat_def::{GP_NUM, NMI_STACK_SIZE};
use thiserror::Error;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, U64};

/// Size of the register frame the consuming OS reads: x0..x30, sp, pc,
/// pstate and its two bookkeeping words.
pub const SNAPSHOT_BODY_LEN: usize = 288;

/// What EL3 leaves behind for the NMI handler when it redirects an
/// interrupted context.
///
/// One of these sits at the start of every core's slot in the snapshot
/// region, `NMI_STACK_SIZE` bytes apart.
#[derive(Copy, Clone, Debug, PartialEq, Eq, AsBytes, FromBytes)]
#[repr(C)]
pub struct ContextSnapshot {
    pub gpregs: [U64<LittleEndian>; GP_NUM],
    pub sp_el1: U64<LittleEndian>,
    pub elr_el3: U64<LittleEndian>,
    pub spsr_el3: U64<LittleEndian>,
    // `orig_x0` and `syscallno` in the consumer's frame. Nothing meaningful
    // to put there from EL3; always zero.
    pub reserved: [U64<LittleEndian>; 2],
    /// Interrupt id that caused the capture
    pub tag: U64<LittleEndian>,
    /// Wrapping byte sum of everything above
    pub checksum: U64<LittleEndian>,
}

const CHECKSUM_OFFSET: usize = core::mem::size_of::<ContextSnapshot>() - 8;

// The frame the OS expects has to stay byte-for-byte where it is, and the
// whole record has to fit in a slot.
const _: () = assert!(CHECKSUM_OFFSET == SNAPSHOT_BODY_LEN + 8);
const _: () = assert!(core::mem::size_of::<ContextSnapshot>() <= NMI_STACK_SIZE);

/// Problems decoding a snapshot out of raw memory
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot needs {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// The slot was overwritten, torn, or never written at all.
    #[error("snapshot checksum mismatch; stored {stored:#x}, computed {computed:#x}")]
    ChecksumMismatch { stored: u64, computed: u64 },
}

impl ContextSnapshot {
    /// Size of the record in bytes
    pub const SIZE: usize = core::mem::size_of::<ContextSnapshot>();

    /// Builds a sealed record: reserved words zeroed, checksum filled in.
    pub fn capture(
        gpregs: &[u64; GP_NUM],
        sp_el1: u64,
        elr_el3: u64,
        spsr_el3: u64,
        tag: u64,
    ) -> ContextSnapshot {
        let mut snap = ContextSnapshot::new_zeroed();
        for (slot, value) in snap.gpregs.iter_mut().zip(gpregs.iter()) {
            slot.set(*value);
        }
        snap.sp_el1.set(sp_el1);
        snap.elr_el3.set(elr_el3);
        snap.spsr_el3.set(spsr_el3);
        snap.tag.set(tag);
        snap.seal();
        snap
    }

    /// Sum of every byte preceding the checksum word
    pub fn compute_checksum(&self) -> u64 {
        self.as_bytes()[..CHECKSUM_OFFSET]
            .iter()
            .fold(0u64, |sum, b| sum.wrapping_add(u64::from(*b)))
    }

    pub fn seal(&mut self) {
        let sum = self.compute_checksum();
        self.checksum.set(sum);
    }

    pub fn verify(&self) -> Result<(), SnapshotError> {
        let stored = self.checksum.get();
        let computed = self.compute_checksum();
        if stored != computed {
            return Err(SnapshotError::ChecksumMismatch { stored, computed });
        }
        Ok(())
    }

    /// Decodes the record at the start of `bytes` without checking it.
    pub fn from_prefix(bytes: &[u8]) -> Result<ContextSnapshot, SnapshotError> {
        let (snap, _) = LayoutVerified::<_, ContextSnapshot>::new_from_prefix(bytes)
            .ok_or(SnapshotError::Truncated {
                expected: Self::SIZE,
                got: bytes.len(),
            })?;
        Ok(*snap)
    }

    pub fn gpreg(&self, n: usize) -> Option<u64> {
        self.gpregs.get(n).map(|r| r.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic() -> ContextSnapshot {
        let mut gpregs = [0u64; GP_NUM];
        for (i, r) in gpregs.iter_mut().enumerate() {
            *r = 0x1111_0000_0000_0000 | i as u64;
        }
        ContextSnapshot::capture(&gpregs, 0xffff_8000_0010_0000, 0x4008_1234, 0x3c5, 35)
    }

    #[test]
    fn layout() {
        assert_eq!(ContextSnapshot::SIZE, 304);
        let snap = synthetic();
        let bytes = snap.as_bytes();
        // x1 lives in the second word, little endian
        assert_eq!(&bytes[8..16], &(0x1111_0000_0000_0001u64).to_le_bytes());
        assert_eq!(&bytes[31 * 8..32 * 8], &(0xffff_8000_0010_0000u64).to_le_bytes());
        assert_eq!(&bytes[32 * 8..33 * 8], &(0x4008_1234u64).to_le_bytes());
        assert_eq!(&bytes[34 * 8..36 * 8], &[0u8; 16]);
        assert_eq!(&bytes[36 * 8..37 * 8], &35u64.to_le_bytes());
    }

    #[test]
    fn checksum_is_byte_sum_of_preceding_record() {
        let snap = synthetic();
        let bytes = snap.as_bytes();
        let expected: u64 = bytes[..296].iter().map(|b| u64::from(*b)).sum();
        assert_eq!(snap.checksum.get(), expected);
        assert_eq!(snap.verify(), Ok(()));
    }

    #[test]
    fn corruption_anywhere_in_the_record_is_detected() {
        let snap = synthetic();
        for offset in [0usize, 7, 100, 250, 287, 290, 295] {
            let mut bytes = snap.as_bytes().to_vec();
            bytes[offset] = bytes[offset].wrapping_add(1);
            let corrupted = ContextSnapshot::from_prefix(&bytes).unwrap();
            assert!(
                matches!(
                    corrupted.verify(),
                    Err(SnapshotError::ChecksumMismatch { .. })
                ),
                "corruption at byte {offset} went unnoticed"
            );
        }
    }

    #[test]
    fn short_buffer_is_rejected() {
        let snap = synthetic();
        assert_eq!(
            ContextSnapshot::from_prefix(&snap.as_bytes()[..200]),
            Err(SnapshotError::Truncated {
                expected: 304,
                got: 200
            })
        );
    }
}
