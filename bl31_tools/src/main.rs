// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use bl31_areas::ContextSnapshot;
use bl31_nmi::fake::{FakeGic, FixedCore, ScratchBuffer};
use bl31_nmi::{CpuContext, NmiService, RedirectConfig};
use clap::Parser;
use colored::Colorize;
use log::info;
use plat_def::{PERI_WDT5_S, PLATFORM_CORE_COUNT, PRIVATE_NMI_SMC_FIQ_GLUE_ID};
use std::path::PathBuf;

mod layout;
mod report;

use layout::Layout;
use report::SlotReport;

#[derive(Debug, Parser)]
enum Command {
    /// Decode and check the per-core snapshots in a dump of the NMI context
    /// region
    Decode {
        #[clap(short, long)]
        verbose: bool,

        /// Print the decoded slots as JSON instead of checking them
        #[clap(long)]
        json: bool,

        /// Only look at this core's slot
        #[clap(long)]
        core: Option<usize>,

        /// TOML file describing the region (cores, stride, base)
        #[clap(long)]
        layout: Option<PathBuf>,

        src_dump: PathBuf,
    },
    /// Run the EL3 NMI path against simulated hardware and write out the
    /// region it leaves behind
    Capture {
        /// output file (binary)
        #[clap(short = 'o', long = "out")]
        dest_dump: PathBuf,

        /// Core that takes the interrupt
        #[clap(long, default_value_t = 0)]
        core: usize,

        /// Interrupt id as acknowledged from the GIC
        #[clap(long, value_parser = parse_int::parse::<u32>, default_value_t = PERI_WDT5_S)]
        id: u32,

        /// OS NMI handler (SMC x1)
        #[clap(long, value_parser = parse_int::parse::<u64>, default_value = "0xffff800010080000")]
        transfer: u64,

        /// Snapshot region base (SMC x2)
        #[clap(long, value_parser = parse_int::parse::<u64>, default_value = "0x4f000000")]
        base: u64,

        /// ELR_EL3 of the interrupted context
        #[clap(long, value_parser = parse_int::parse::<u64>, default_value = "0x400000")]
        elr: u64,

        /// SPSR_EL3 of the interrupted context
        #[clap(long, value_parser = parse_int::parse::<u64>, default_value = "0x0")]
        spsr: u64,
    },
}

#[derive(Debug, Parser)]
#[clap(name = "nmi-snapshot", max_term_width = 80)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

fn main() -> Result<()> {
    let cmd = Opts::parse();

    // Decode has a custom logger; everyone else can use the default
    if !matches!(cmd.cmd, Command::Decode { json: false, .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cmd.cmd {
        Command::Decode {
            verbose,
            json,
            core,
            layout,
            src_dump,
        } => {
            let layout = match layout {
                Some(path) => Layout::load(&path)?,
                None => Layout::default(),
            };
            let dump = std::fs::read(&src_dump)
                .with_context(|| format!("could not read {}", src_dump.display()))?;

            let cores: Vec<usize> = match core {
                Some(c) if c < layout.cores => vec![c],
                Some(c) => bail!("core {c} is outside the layout ({} cores)", layout.cores),
                None => (0..layout.cores).collect(),
            };

            let mut slots = Vec::new();
            for c in cores {
                let (offset, address) = layout
                    .slot_offset(c)
                    .zip(layout.slot_address(c))
                    .with_context(|| format!("core {c}'s slot is outside the address space"))?;
                let bytes = dump.get(offset..).unwrap_or_default();
                let snap = ContextSnapshot::from_prefix(bytes)
                    .with_context(|| format!("dump too short for core {c}'s slot"))?;
                slots.push((c, address, snap));
            }

            if json {
                let reports: Vec<SlotReport> = slots
                    .iter()
                    .map(|(c, address, snap)| SlotReport::new(*c, *address, snap))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&reports)?);
                return Ok(());
            }

            report::init_decode_logger(verbose);
            let mut failed = false;
            for (c, address, snap) in &slots {
                if !report::check_slot(*c, *address, snap) {
                    failed = true;
                }
            }
            if failed {
                println!("{}", "Some slots did not check out".red());
                bail!("verification failed; see log for details");
            }
            println!("{}", "All slots OK".green());
        }
        Command::Capture {
            dest_dump,
            core,
            id,
            transfer,
            base,
            elr,
            spsr,
        } => {
            if core >= PLATFORM_CORE_COUNT {
                bail!("core {core} does not exist; there are {PLATFORM_CORE_COUNT}");
            }

            let config = RedirectConfig::new();
            let mut service = NmiService::new(
                FakeGic::new(),
                FixedCore {
                    core,
                    sp_el1: 0xffff_8000_0000_0000 | (core as u64) << 16,
                },
                ScratchBuffer::new(base),
                &config,
            );

            let x0 = service.handle_smc(PRIVATE_NMI_SMC_FIQ_GLUE_ID, transfer, base);
            info!("SMC returned {x0:#x}, redirect {:?}", config.state());

            let mut ctx = CpuContext::default();
            for (n, reg) in ctx.gpregs.registers.iter_mut().enumerate() {
                *reg = 0x1111_1111_0000_0000 | n as u64;
            }
            ctx.el3_state.elr_el3 = elr;
            ctx.el3_state.spsr_el3 = spsr;

            service.gic_mut().pending.push_back(id);
            service.el3_interrupt_handler(Some(&mut ctx));

            info!(
                "returning to {:#x} with spsr {:#x}",
                ctx.el3_state.elr_el3, ctx.el3_state.spsr_el3
            );
            for event in &service.gic().events {
                info!("gic: {:?}", event);
            }

            std::fs::write(&dest_dump, service.memory().bytes())
                .with_context(|| format!("could not write {}", dest_dump.display()))?;
            info!("Snapshot region written to {}", dest_dump.display());
        }
    }

    Ok(())
}
