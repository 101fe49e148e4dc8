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


//! KGG container decoder
//!
//! Newer KuGou downloads ship as KGG: a header with fixed-offset fields
//! followed by a QMC2-encrypted audio payload. The header stores the
//! payload start at offset 16, the cipher mode at offset 20 (only mode 5
//! exists in the wild) and, at offset 68, a length-prefixed "audio hash"
//! string that keys the ekey lookup in the client's key store.
//!
//! Header parsing needs seeks, so construction requires a real file; the
//! decrypted stream is then read sequentially. Offsets fed to the cipher
//! are relative to the payload start, not the file start.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::crypto::{decrypt_ekey, Qmc2Cipher};
use crate::error::{Result, TuneFreeError};
use crate::keystore::KeyProvider;

const HEADER_LEN_OFFSET: u64 = 16;
const AUDIO_HASH_OFFSET: u64 = 68;
const SUPPORTED_MODE: u32 = 5;

// Audio hashes are short hex strings; anything near the header size is a
// corrupt length field, not a hash.
const MAX_HASH_LEN: usize = 0x400;

/// Streaming decoder for a KGG file.
#[derive(Debug)]
pub struct KggDecoder {
    file: File,
    header_len: u64,
    cipher: Qmc2Cipher,
    offset: u64,
    started: bool,
}

impl KggDecoder {
    /// Open a KGG file and resolve its audio key through `provider`.
    pub fn open(path: &Path, provider: &KeyProvider) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TuneFreeError::RandomAccessRequired);
        }
        let file = File::open(path)?;
        Self::from_file(file, provider)
    }

    /// Build a decoder from an already-open file handle.
    pub fn from_file(mut file: File, provider: &KeyProvider) -> Result<Self> {
        file.seek(SeekFrom::Start(HEADER_LEN_OFFSET))?;
        let mut hdr = [0u8; 8];
        file.read_exact(&mut hdr)?;
        let header_len = u32::from_le_bytes(hdr[0..4].try_into().unwrap()) as u64;
        let mode = u32::from_le_bytes(hdr[4..8].try_into().unwrap());
        if mode != SUPPORTED_MODE {
            return Err(TuneFreeError::UnsupportedMode(mode));
        }

        file.seek(SeekFrom::Start(AUDIO_HASH_OFFSET))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let hash_len = u32::from_le_bytes(len_buf) as usize;
        if hash_len == 0 || hash_len > MAX_HASH_LEN {
            return Err(TuneFreeError::decrypt(format!(
                "implausible audio hash length {hash_len}"
            )));
        }
        let mut hash_buf = vec![0u8; hash_len];
        file.read_exact(&mut hash_buf)?;
        let audio_hash = String::from_utf8_lossy(&hash_buf).into_owned();

        let ekey = provider.lookup(&audio_hash)?;
        let inner_key = decrypt_ekey(&ekey)?;
        debug!(
            "kgg audio hash {audio_hash}: inner key {} bytes, payload at {header_len}",
            inner_key.len()
        );

        Ok(KggDecoder {
            file,
            header_len,
            cipher: Qmc2Cipher::new(&inner_key),
            offset: 0,
            started: false,
        })
    }
}

impl Read for KggDecoder {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.started {
            self.file.seek(SeekFrom::Start(self.header_len))?;
            self.started = true;
        }
        let n = self.file.read(buf)?;
        if n > 0 {
            self.cipher.decrypt(&mut buf[..n], self.offset);
            self.offset += n as u64;
        }
        Ok(n)
    }
}
