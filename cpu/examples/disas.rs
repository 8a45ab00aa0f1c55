// SPDX-License-Identifier: MPL-2.0

//! Disassembles a raw little-endian code image.
//!
//! Usage: `disas <IMAGE> [BASE]`, where `BASE` is the hexadecimal address of the first word.

use std::io::{self, Write as _};

use r3k_cpu::Instr;

fn main() -> io::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: disas <IMAGE> [BASE]");
        std::process::exit(2);
    };
    let base = args
        .next()
        .and_then(|it| u32::from_str_radix(it.trim_start_matches("0x"), 16).ok())
        .unwrap_or(r3k_cpu::RESET_VECTOR);
    let image = std::fs::read(path)?;

    let mut out = io::stdout().lock();
    for (i, bytes) in image.chunks_exact(4).enumerate() {
        let code = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let addr = base.wrapping_add(4 * i as u32);
        match Instr::decode(code) {
            Some(instr) => writeln!(out, "{:08x}   {:08x}   {}", addr, code, instr.asm())?,
            None => writeln!(out, "{:08x}   {:08x}", addr, code)?,
        }
    }

    Ok(())
}
