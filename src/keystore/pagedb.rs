// TuneFree - Encrypted Music Container Converter
// Copyright (C) 2025 TuneFree contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! KGMusicV3.db page decryption
//!
//! The key store is a SQLite file encrypted in 1024-byte pages, numbered
//! from 1. Every page gets its own AES-128-CBC key and IV, both MD5
//! digests over the 16-byte master key, the little-endian page number and
//! a fixed magic; the IV input additionally runs the page number through
//! four rounds of a 32-bit congruential generator. Page 1 is special: its
//! first 16 bytes are replaced by a marker, bytes 8..16 hold the start of
//! the ciphertext (swapped into place before decrypting), and the real
//! SQLite magic is re-synthesized on output. Pages 2.. are plain
//! whole-page CBC.
//!
//! Already-decrypted files (page 1 starts with the SQLite magic) pass
//! through unchanged.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use tempfile::{NamedTempFile, TempPath};

use crate::crypto::aes_cbc;
use crate::error::{Result, TuneFreeError};

const PAGE_SIZE: usize = 1024;
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const MASTER_KEY: [u8; 16] = [
    0x1d, 0x61, 0x31, 0x45, 0xb2, 0x47, 0xbf, 0x7f, //
    0x3d, 0x18, 0x96, 0x72, 0x14, 0x4f, 0xe4, 0xbf,
];
const KEY_MAGIC: u32 = 0x546C_4173;

/// Decrypt an encrypted `KGMusicV3.db` into a temp file.
///
/// The returned [`TempPath`] deletes the plaintext image when dropped.
pub fn decrypt_kg_database(db_path: &Path) -> Result<TempPath> {
    let mut input = File::open(db_path)?;
    let size = input.metadata()?.len();
    if size == 0 || size % PAGE_SIZE as u64 != 0 {
        return Err(TuneFreeError::CorruptKeyStore(format!(
            "size {size} is not a multiple of the {PAGE_SIZE}-byte page"
        )));
    }
    let pages = (size / PAGE_SIZE as u64) as u32;

    let tmp = NamedTempFile::new()?;
    let mut out = BufWriter::new(tmp.as_file().try_clone()?);

    let mut page_buf = [0u8; PAGE_SIZE];
    for page_no in 1..=pages {
        input.read_exact(&mut page_buf)?;

        if page_no == 1 {
            if page_buf.starts_with(SQLITE_MAGIC) {
                // Already a plain SQLite file: emit page 1 and bulk-copy
                // the rest from an explicit offset.
                debug!("key store {:?} is unencrypted, copying through", db_path);
                out.write_all(&page_buf)?;
                input.seek(SeekFrom::Start(PAGE_SIZE as u64))?;
                io::copy(&mut input, &mut out)?;
                out.flush()?;
                return Ok(tmp.into_temp_path());
            }
            if !is_valid_page1_header(&page_buf) {
                return Err(TuneFreeError::CorruptKeyStore(
                    "page 1 is neither plain SQLite nor a valid encrypted header".into(),
                ));
            }

            let (key, iv) = derive_page_key(page_no);
            // The ciphertext's first half-block lives at bytes 8..16;
            // swap it over the marker before decrypting from offset 16.
            let prefix: [u8; 8] = page_buf[8..16].try_into().unwrap();
            page_buf[16..24].copy_from_slice(&prefix);
            aes_cbc::decrypt_in_place(&mut page_buf[16..], &key, &iv)?;

            out.write_all(SQLITE_MAGIC)?;
            out.write_all(&page_buf[16..])?;
        } else {
            let (key, iv) = derive_page_key(page_no);
            aes_cbc::decrypt_in_place(&mut page_buf, &key, &iv)?;
            out.write_all(&page_buf)?;
        }
    }

    out.flush()?;
    debug!("decrypted key store {:?} ({pages} pages)", db_path);
    Ok(tmp.into_temp_path())
}

/// Check the marker an encrypted page 1 carries at bytes 16..24.
///
/// The second word is a constant; the first, after the bitfield shuffle,
/// must be a power-of-two page size between 0x200 and 0x10000.
fn is_valid_page1_header(page: &[u8]) -> bool {
    if page.len() < 24 {
        return false;
    }
    let o10 = u32::from_le_bytes(page[16..20].try_into().unwrap());
    let o14 = u32::from_le_bytes(page[20..24].try_into().unwrap());
    let v6 = ((o10 & 0xFF) << 8) | ((o10 & 0xFF00) << 16);
    o14 == 0x2020_4000
        && v6.wrapping_sub(0x200) <= 0xFE00
        && (v6 & v6.wrapping_sub(1)) == 0
}

/// Derive the per-page AES key and IV.
fn derive_page_key(page_no: u32) -> ([u8; 16], [u8; 16]) {
    let mut buf = [0u8; 24];
    buf[..16].copy_from_slice(&MASTER_KEY);
    buf[16..20].copy_from_slice(&page_no.to_le_bytes());
    buf[20..24].copy_from_slice(&KEY_MAGIC.to_le_bytes());
    let key: [u8; 16] = md5::compute(buf).0;

    // IV input: four steps of a congruential generator seeded by the page
    // number overwrite the first 16 bytes. All arithmetic wraps at 32 bits.
    let mut ebx = page_no.wrapping_add(1);
    for chunk in buf[..16].chunks_exact_mut(4) {
        let quotient = ebx / 0xCE26;
        let mut ecx = 0x9EF4u32
            .wrapping_mul(ebx)
            .wrapping_sub(0x7FFF_FF07u32.wrapping_mul(quotient));
        if ecx & 0x8000_0000 != 0 {
            ecx = ecx.wrapping_add(0x7FFF_FF07);
        }
        ebx = ecx;
        chunk.copy_from_slice(&ebx.to_le_bytes());
    }
    let iv: [u8; 16] = md5::compute(&buf[..16]).0;

    (key, iv)
}
