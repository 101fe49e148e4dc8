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

//! Shared fixture builders for the integration suite.
//!
//! These rebuild the on-disk container formats from the published layout
//! rather than reusing crate internals, so an encode/decode mismatch in
//! the crate cannot cancel itself out here.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tunefree_core::crypto::Qmc2Cipher;
use tunefree_core::BatchItem;

/// Opt into log output with `RUST_LOG=debug cargo test -- --nocapture`.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const TEA_DELTA: u32 = 0x9e37_79b9;

fn tea_single_round(v: u32, sum: u32, k1: u32, k2: u32) -> u32 {
    ((v << 4).wrapping_add(k1)) ^ (v.wrapping_add(sum)) ^ ((v >> 5).wrapping_add(k2))
}

fn tea_ecb_encrypt(value: u64, key: &[u32; 4]) -> u64 {
    let mut y = (value >> 32) as u32;
    let mut z = value as u32;
    let mut sum: u32 = 0;
    for _ in 0..16 {
        sum = sum.wrapping_add(TEA_DELTA);
        y = y.wrapping_add(tea_single_round(z, sum, key[0], key[1]));
        z = z.wrapping_add(tea_single_round(y, sum, key[2], key[3]));
    }
    ((y as u64) << 32) | (z as u64)
}

/// Frame and encrypt a payload the way the ekey TEA-CBC layer expects:
/// skip byte, salt, payload, 7 zero-pad bytes, chained over the rolling
/// iv pair.
fn tea_cbc_encrypt(payload: &[u8], key: &[u32; 4]) -> Vec<u8> {
    let base = 1 + 2 + payload.len() + 7;
    let extra = (8 - base % 8) % 8;

    let mut plain = Vec::with_capacity(base + extra);
    plain.push(0x90 | extra as u8);
    plain.extend(std::iter::repeat(0x33).take(extra + 2));
    plain.extend_from_slice(payload);
    plain.extend(std::iter::repeat(0).take(7));

    let mut iv1: u64 = 0;
    let mut iv2: u64 = 0;
    let mut cipher = Vec::with_capacity(plain.len());
    for block in plain.chunks_exact(8) {
        let p = u64::from_be_bytes(block.try_into().unwrap());
        let tmp = p ^ iv1;
        let c = tea_ecb_encrypt(tmp, key) ^ iv2;
        iv1 = c;
        iv2 = tmp;
        cipher.extend_from_slice(&c.to_be_bytes());
    }
    cipher
}

/// Wrap an inner audio key into a V1 ekey string.
pub fn make_ekey(inner: &[u8]) -> String {
    assert!(inner.len() >= 8);
    let key: [u32; 4] = [
        0x6900_5600 | ((inner[0] as u32) << 16) | (inner[1] as u32),
        0x4600_3800 | ((inner[2] as u32) << 16) | (inner[3] as u32),
        0x2b00_2000 | ((inner[4] as u32) << 16) | (inner[5] as u32),
        0x1500_0b00 | ((inner[6] as u32) << 16) | (inner[7] as u32),
    ];
    let mut raw = inner[..8].to_vec();
    raw.extend_from_slice(&tea_cbc_encrypt(&inner[8..], &key));
    BASE64.encode(raw)
}

/// Write a KGG container holding `audio` encrypted for `inner_key`.
pub fn write_kgg(dir: &Path, name: &str, audio: &[u8], inner_key: &[u8], hash: &str) -> PathBuf {
    let header_len: u32 = 0x400;
    let mut data = vec![0u8; header_len as usize];
    data[16..20].copy_from_slice(&header_len.to_le_bytes());
    data[20..24].copy_from_slice(&5u32.to_le_bytes());
    data[68..72].copy_from_slice(&(hash.len() as u32).to_le_bytes());
    data[72..72 + hash.len()].copy_from_slice(hash.as_bytes());

    // The QMC2 keystream is its own inverse.
    let mut payload = audio.to_vec();
    Qmc2Cipher::new(inner_key).decrypt(&mut payload, 0);
    data.extend_from_slice(&payload);

    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// A plausible FLAC stream: magic plus deterministic filler.
pub fn flac_payload(len: usize) -> Vec<u8> {
    let mut audio = b"fLaC\x00\x00\x00\x22".to_vec();
    audio.extend((0..len.saturating_sub(8)).map(|i| (i * 31 + 5) as u8));
    audio
}

/// A plausible MP3 stream: ID3 tag header plus filler.
pub fn mp3_payload(len: usize) -> Vec<u8> {
    let mut audio = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    audio.extend((0..len.saturating_sub(10)).map(|i| (i * 17 + 1) as u8));
    audio
}

/// Batch item for a file on disk.
pub fn batch_item(path: &Path, ordinal: usize) -> BatchItem {
    BatchItem {
        path: path.to_path_buf(),
        origin_path: path.to_string_lossy().into_owned(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        temporary: false,
        current: ordinal,
    }
}

/// MAP-variant inner key (17 bytes).
pub fn map_inner_key() -> Vec<u8> {
    (1..=17).collect()
}

/// RC4-variant inner key (>= 300 bytes).
pub fn rc4_inner_key() -> Vec<u8> {
    (0..384u32).map(|i| (i % 250 + 1) as u8).collect()
}
