// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small bit-twiddling and formatting helpers shared by the emulator crates.

use std::io;

#[inline(always)]
pub fn sign_extend_8(value: u8) -> u32 {
    ((value as i8) as i32) as u32
}

#[inline(always)]
pub fn sign_extend_16(value: u16) -> u32 {
    ((value as i16) as i32) as u32
}

pub mod lane {
    //! Byte-lane access into little-endian 32-bit words.
    //!
    //! `len` is the access width in bytes (1, 2 or 4) and `addr` is any address whose low two bits
    //! select the lane.

    /// The bits of a word covered by an access of `len` bytes at `addr`.
    #[inline]
    pub fn mask(addr: u32, len: u32) -> u32 {
        let bits = match len {
            1 => 0xff,
            2 => 0xffff,
            _ => return !0,
        };

        bits << shift(addr, len)
    }

    #[inline]
    pub fn shift(addr: u32, len: u32) -> u32 {
        (addr & 0b11 & !(len - 1)) * 8
    }

    /// Extracts the lane selected by `addr` from `word`, zero-extended.
    #[inline]
    pub fn extract(word: u32, addr: u32, len: u32) -> u32 {
        (word & mask(addr, len)) >> shift(addr, len)
    }

    /// Replaces the lane selected by `addr` in `word` with `value`.
    #[inline]
    pub fn insert(word: u32, value: u32, addr: u32, len: u32) -> u32 {
        let mask = mask(addr, len);

        (word & !mask) | ((value << shift(addr, len)) & mask)
    }
}

/// Writes a classic hex dump of `bytes`, sixteen per row, labelling each row with its address.
pub fn dump_hex(w: &mut impl io::Write, base: u32, bytes: &[u8]) -> io::Result<()> {
    for (i, row) in bytes.chunks(16).enumerate() {
        let hex = row
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<String>>()
            .join(" ");
        let text = row
            .iter()
            .map(|byte| {
                if byte.is_ascii_graphic() {
                    char::from(*byte)
                } else {
                    '.'
                }
            })
            .collect::<String>();

        writeln!(
            w,
            "{:08x}   {:<47}   {}",
            base.wrapping_add((i * 16) as u32),
            hex,
            text,
        )?;
    }

    Ok(())
}
