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


//! NCM container decoder
//!
//! NetEase Cloud Music layout:
//!
//! 1. magic `CTENFDAM` plus a 2-byte gap
//! 2. key block: length-prefixed, XOR `0x64`, AES-128-ECB under a fixed
//!    core key with PKCS7 padding; the plaintext starts with a 17-byte
//!    vendor tag that is stripped
//! 3. metadata block: length-prefixed (may be zero-length), unused here
//! 4. 4-byte CRC plus a 5-byte gap
//! 5. cover image block: length-prefixed, unused here
//! 6. audio, XORed with a 256-byte keystream from a modified RC4 PRGA
//!    that depends only on `position % 256`
//!
//! Only the audio stream matters to the pipeline; metadata and cover are
//! skipped over.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use aes::Aes128;
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, KeyInit};

use crate::error::{Result, TuneFreeError};

type Aes128EcbDec = ecb::Decryptor<Aes128>;

const NCM_MAGIC: &[u8; 8] = b"CTENFDAM";

// "hzHRAmso5kInbaxW"
const CORE_KEY: [u8; 16] = [
    0x68, 0x7A, 0x48, 0x52, 0x41, 0x6D, 0x73, 0x6F, //
    0x35, 0x6B, 0x49, 0x6E, 0x62, 0x61, 0x78, 0x57,
];

const KEY_TAG_LEN: usize = 17; // "neteasecloudmusic"
const MAX_BLOCK_LEN: u32 = 1 << 20;

/// Streaming decoder for an NCM file.
pub struct NcmDecoder {
    file: File,
    key_stream: [u8; 256],
    pos: u64,
}

impl NcmDecoder {
    /// Parse the container up to the audio payload and key the stream.
    pub fn new(mut file: File) -> Result<Self> {
        let mut magic = [0u8; 10];
        file.read_exact(&mut magic)
            .map_err(|_| TuneFreeError::decrypt("file too short for an NCM header"))?;
        if &magic[..8] != NCM_MAGIC {
            return Err(TuneFreeError::decrypt("not an NCM file"));
        }

        let mut key_data = read_block(&mut file)?;
        for byte in &mut key_data {
            *byte ^= 0x64;
        }
        let rc4_key = Aes128EcbDec::new((&CORE_KEY).into())
            .decrypt_padded_vec_mut::<Pkcs7>(&key_data)
            .map_err(|_| TuneFreeError::decrypt("NCM key block padding invalid"))?;
        if rc4_key.len() <= KEY_TAG_LEN {
            return Err(TuneFreeError::decrypt("NCM key block too short"));
        }
        let rc4_key = &rc4_key[KEY_TAG_LEN..];

        // Metadata, CRC + gap, cover: all skipped.
        skip_block(&mut file)?;
        file.seek(SeekFrom::Current(9))?;
        skip_block(&mut file)?;

        Ok(NcmDecoder {
            file,
            key_stream: derive_key_stream(rc4_key),
            pos: 0,
        })
    }
}

impl Read for NcmDecoder {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.file.read(buf)?;
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte ^= self.key_stream[((self.pos + i as u64) % 256) as usize];
        }
        self.pos += n as u64;
        Ok(n)
    }
}

fn read_block_len(file: &mut File) -> Result<u32> {
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_BLOCK_LEN {
        return Err(TuneFreeError::decrypt(format!(
            "implausible NCM block length {len}"
        )));
    }
    Ok(len)
}

fn read_block(file: &mut File) -> Result<Vec<u8>> {
    let len = read_block_len(file)?;
    let mut data = vec![0u8; len as usize];
    file.read_exact(&mut data)?;
    Ok(data)
}

fn skip_block(file: &mut File) -> Result<()> {
    let len = read_block_len(file)?;
    file.seek(SeekFrom::Current(len as i64))?;
    Ok(())
}

/// Precompute the 256-byte keystream of NetEase's RC4 variant.
///
/// The KSA is standard over a 256-entry box; the output stage replaces the
/// PRGA with a fixed position-indexed lookup, which makes the stream
/// periodic with period 256.
fn derive_key_stream(key: &[u8]) -> [u8; 256] {
    let mut s = [0u8; 256];
    for (i, v) in s.iter_mut().enumerate() {
        *v = i as u8;
    }
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len()] as usize) & 0xFF;
        s.swap(i, j);
    }

    let mut stream = [0u8; 256];
    for (i, out) in stream.iter_mut().enumerate() {
        let a = (i + 1) & 0xFF;
        let b = s[(a + s[a] as usize) & 0xFF] as usize;
        *out = s[(s[a] as usize + b) & 0xFF];
    }
    stream
}
