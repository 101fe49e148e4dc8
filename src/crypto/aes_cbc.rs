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


//! AES-128-CBC decryption
//!
//! The key-store pages are raw CBC blocks with no padding scheme, so this
//! wrapper decrypts in place and strips nothing.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes128;

use crate::error::{Result, TuneFreeError};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Decrypt a whole buffer of AES-128-CBC ciphertext in place.
///
/// The length must be a multiple of the 16-byte block size; no padding is
/// removed.
pub fn decrypt_in_place(buf: &mut [u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<()> {
    if buf.len() % 16 != 0 {
        return Err(TuneFreeError::decrypt(format!(
            "AES-CBC ciphertext length {} is not block aligned",
            buf.len()
        )));
    }

    let mut dec = Aes128CbcDec::new(key.into(), iv.into());
    for block in buf.chunks_exact_mut(16) {
        dec.decrypt_block_mut(aes::Block::from_mut_slice(block));
    }
    Ok(())
}
