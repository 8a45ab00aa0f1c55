// SPDX-License-Identifier: MPL-2.0

//! Runs a BIOS image, printing each instruction as it executes.
//!
//! Usage: `emu_cli <BIOS> [INSTRUCTIONS]`

use anyhow::Context as _;

fn main() -> anyhow::Result<()> {
    r3k::log::init();

    let mut args = std::env::args().skip(1);
    let bios_path = args.next().context("expected BIOS filepath")?;
    let count: u64 = match args.next() {
        Some(it) => it.parse().context("instruction count is not a number")?,
        None => 1_000,
    };
    let bios = std::fs::read(&bios_path).with_context(|| format!("failed to read {}", bios_path))?;

    let mut core = r3k::Core::default();
    core.load_bios(&bios)?;

    let mut cpu = core.cpu();
    for _ in 0..count {
        let pc = cpu.reg().pc();
        let offset = (pc & 0x1fff_ffff).wrapping_sub(r3k_cpu::bus::Bios::BASE_ADDR) as usize;
        match bios.get(offset..offset + 4) {
            Some(bytes) => {
                let code = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                match r3k_cpu::Instr::decode(code) {
                    Some(instr) => println!("{:08x}   {:08x}   {}", pc, code, instr.asm()),
                    None => println!("{:08x}   {:08x}", pc, code),
                }
            }
            None => println!("{:08x}   (outside ROM)", pc),
        }

        cpu.execute_next_instr();
    }

    Ok(())
}
