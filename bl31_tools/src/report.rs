// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bl31_areas::{ContextSnapshot, SecureInterrupt, SnapshotError, Spsr};
use log::{debug as okay, error, info, trace, warn};
use num_traits::FromPrimitive;
use serde::Serialize;
use std::io::Write as _;
use zerocopy::AsBytes;

/// Log target for the line that opens each slot's section
const SLOT_HEADER: &str = "nmi_snapshot::slot";

fn label(level: log::Level) -> (&'static str, env_logger::fmt::Color) {
    use env_logger::fmt::Color;
    match level {
        log::Level::Error => ("FAIL", Color::Red),
        log::Level::Warn => ("WARN", Color::Yellow),
        log::Level::Info => ("", Color::Cyan),
        log::Level::Debug => ("OKAY", Color::Green),
        log::Level::Trace => ("raw", Color::Blue),
    }
}

/// Initializes a logger that lays out what `check_slot` finds, one section
/// per core: a bold header, then one gutter-labelled line per finding.
pub fn init_decode_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format(|buf, record| {
            if record.target() == SLOT_HEADER {
                let mut header = buf.style();
                header.set_bold(true);
                return writeln!(buf, "{}", header.value(record.args()));
            }

            let (text, color) = label(record.level());
            let mut style = buf.style();
            style.set_color(color);
            writeln!(
                buf,
                "  {: >4} | {}",
                style.value(text),
                record.args().to_string().replace('\n', "\n       | ")
            )
        })
        .filter(
            None,
            if verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Debug
            },
        )
        .init();
}

/// One decoded slot, in the shape `--json` prints it
#[derive(Debug, Serialize)]
pub struct SlotReport {
    pub core: usize,
    pub address: String,
    /// Never written: all zero bytes, which would otherwise pass the checksum
    pub empty: bool,
    pub valid: bool,
    pub source: Option<String>,
    pub tag: u64,
    pub x: Vec<String>,
    pub sp_el1: String,
    pub elr_el3: String,
    pub spsr_el3: String,
    pub checksum: String,
    pub computed_checksum: String,
}

fn hex64(value: u64) -> String {
    format!("{value:#018x}")
}

fn is_empty(snap: &ContextSnapshot) -> bool {
    snap.as_bytes().iter().all(|b| *b == 0)
}

/// Name of the interrupt that produced a snapshot, if it's one of ours
pub fn source_name(tag: u64) -> Option<&'static str> {
    let id = u32::try_from(tag).ok()?;
    SecureInterrupt::from_u32(id).map(|s| match s {
        SecureInterrupt::Watchdog => "watchdog",
        SecureInterrupt::SiblingSgi => "sibling-sgi",
    })
}

impl SlotReport {
    pub fn new(core: usize, address: u64, snap: &ContextSnapshot) -> SlotReport {
        let empty = is_empty(snap);
        SlotReport {
            core,
            address: hex64(address),
            empty,
            valid: !empty && snap.verify().is_ok(),
            source: source_name(snap.tag.get()).map(str::to_owned),
            tag: snap.tag.get(),
            x: snap.gpregs.iter().map(|r| hex64(r.get())).collect(),
            sp_el1: hex64(snap.sp_el1.get()),
            elr_el3: hex64(snap.elr_el3.get()),
            spsr_el3: hex64(snap.spsr_el3.get()),
            checksum: hex64(snap.checksum.get()),
            computed_checksum: hex64(snap.compute_checksum()),
        }
    }
}

/// Logs what's wrong or right with one slot. Returns false if it doesn't
/// hold a usable snapshot.
pub fn check_slot(core: usize, address: u64, snap: &ContextSnapshot) -> bool {
    let mut ok = true;
    info!(target: SLOT_HEADER, "core {} @ {:#x}", core, address);
    trace!("raw: {}", hex::encode(snap.as_bytes()));

    if is_empty(snap) {
        warn!("slot is empty; no NMI was taken on this core");
        return false;
    }

    match snap.verify() {
        Ok(()) => okay!("checksum {:#x} matches", snap.checksum.get()),
        Err(SnapshotError::ChecksumMismatch { stored, computed }) => {
            error!(
                "checksum mismatch: stored {:#x}, computed {:#x}",
                stored, computed
            );
            ok = false;
        }
        Err(e) => {
            error!("{}", e);
            ok = false;
        }
    }

    if snap.reserved.iter().any(|w| w.get() != 0) {
        warn!("reserved words are not zero");
    }

    match source_name(snap.tag.get()) {
        Some(name) => okay!("taken on {} (interrupt {})", name, snap.tag.get()),
        None => {
            error!("unknown interrupt source {}", snap.tag.get());
            ok = false;
        }
    }

    let spsr = Spsr::from(snap.spsr_el3.get());
    info!(
        "interrupted at {:#x}, EL{}{} ({})",
        snap.elr_el3.get(),
        spsr.el(),
        if spsr.sp_sel() { "h" } else { "t" },
        if spsr.aarch32() { "AArch32" } else { "AArch64" },
    );
    info!("sp_el1 {:#x}", snap.sp_el1.get());

    let mut regs = String::new();
    for (n, r) in snap.gpregs.iter().enumerate() {
        regs.push_str(&format!("x{n:<2} {:#018x}", r.get()));
        regs.push(if n % 3 == 2 { '\n' } else { ' ' });
    }
    info!("{}", regs.trim_end());

    ok
}
