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


//! EKey unwrapping
//!
//! Each song's key is stored as an "ekey" string. A V1 ekey is base64 and
//! decodes to eight clear bytes followed by a TEA-CBC envelope whose key
//! is built from those eight bytes and four fixed mask words. A V2 ekey
//! announces itself with an ASCII prefix (the base64 of
//! `"QQMusic EncV2,Key:"`); the remaining bytes pass through two further
//! TEA-CBC layers under fixed keys and yield a V1 ekey.
//!
//! The unwrapped result is the inner audio key handed to
//! [`super::qmc2::Qmc2Cipher`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::tea;
use crate::error::{Result, TuneFreeError};

const EKEY_V2_PREFIX: &[u8] = b"UVFNdXNpYyBFbmNWMixLZXk6";

const EKEY_V2_KEY1: [u8; 16] = [
    0x33, 0x38, 0x36, 0x5A, 0x4A, 0x59, 0x21, 0x40, //
    0x23, 0x2A, 0x24, 0x25, 0x5E, 0x26, 0x29, 0x28,
];
const EKEY_V2_KEY2: [u8; 16] = [
    0x2A, 0x2A, 0x23, 0x21, 0x28, 0x23, 0x24, 0x25, //
    0x26, 0x5E, 0x61, 0x31, 0x63, 0x5A, 0x2C, 0x54,
];

/// Unwrap an ekey string into the inner audio key.
pub fn decrypt_ekey(ekey: &str) -> Result<Vec<u8>> {
    decrypt_ekey_bytes(ekey.trim().as_bytes())
}

fn decrypt_ekey_bytes(ekey: &[u8]) -> Result<Vec<u8>> {
    if let Some(wrapped) = ekey.strip_prefix(EKEY_V2_PREFIX) {
        let key1 = tea::key_from_bytes(&EKEY_V2_KEY1);
        let key2 = tea::key_from_bytes(&EKEY_V2_KEY2);
        let inner = tea::cbc_decrypt(wrapped, &key1)?;
        let inner = tea::cbc_decrypt(&inner, &key2)?;
        decrypt_ekey_v1(&inner)
    } else {
        decrypt_ekey_v1(ekey)
    }
}

fn decrypt_ekey_v1(ekey: &[u8]) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(ekey)
        .map_err(|e| TuneFreeError::ekey(format!("base64 decode failed: {e}")))?;
    if raw.len() < 8 {
        return Err(TuneFreeError::ekey(format!(
            "decoded ekey too short: {} bytes",
            raw.len()
        )));
    }

    let tea_key = v1_mask_key(&raw[..8]);
    let plain = tea::cbc_decrypt(&raw[8..], &tea_key)?;

    let mut out = Vec::with_capacity(8 + plain.len());
    out.extend_from_slice(&raw[..8]);
    out.extend_from_slice(&plain);
    Ok(out)
}

/// Assemble the V1 TEA key from the clear prefix and the mask constants.
fn v1_mask_key(prefix: &[u8]) -> [u32; 4] {
    [
        0x6900_5600 | ((prefix[0] as u32) << 16) | (prefix[1] as u32),
        0x4600_3800 | ((prefix[2] as u32) << 16) | (prefix[3] as u32),
        0x2b00_2000 | ((prefix[4] as u32) << 16) | (prefix[5] as u32),
        0x1500_0b00 | ((prefix[6] as u32) << 16) | (prefix[7] as u32),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tea::tests::cbc_encrypt;

    /// Wrap `inner` (>= 8 bytes) into a V1 ekey string, fixtures only.
    pub(crate) fn make_ekey_v1(inner: &[u8]) -> String {
        assert!(inner.len() >= 8);
        let mut raw = inner[..8].to_vec();
        raw.extend_from_slice(&cbc_encrypt(&inner[8..], &v1_mask_key(&inner[..8])));
        BASE64.encode(raw)
    }

    /// Wrap `inner` into a V2 ekey byte string, fixtures only.
    fn make_ekey_v2(inner: &[u8]) -> Vec<u8> {
        let v1 = make_ekey_v1(inner);
        let key1 = tea::key_from_bytes(&EKEY_V2_KEY1);
        let key2 = tea::key_from_bytes(&EKEY_V2_KEY2);
        // Layers decrypt key1 then key2, so wrap in reverse order.
        let layer2 = cbc_encrypt(v1.as_bytes(), &key2);
        let layer1 = cbc_encrypt(&layer2, &key1);
        let mut out = EKEY_V2_PREFIX.to_vec();
        out.extend_from_slice(&layer1);
        out
    }

    #[test]
    fn v1_round_trip_map_sized_key() {
        let inner: Vec<u8> = (1..=17).collect();
        let ekey = make_ekey_v1(&inner);
        assert_eq!(decrypt_ekey(&ekey).unwrap(), inner);
    }

    #[test]
    fn v1_round_trip_rc4_sized_key() {
        let inner: Vec<u8> = (0..512u32).map(|i| (i % 250 + 1) as u8).collect();
        let ekey = make_ekey_v1(&inner);
        assert_eq!(decrypt_ekey(&ekey).unwrap(), inner);
    }

    #[test]
    fn v2_round_trip() {
        let inner: Vec<u8> = (0..360u32).map(|i| (i % 200 + 5) as u8).collect();
        let ekey = make_ekey_v2(&inner);
        assert_eq!(decrypt_ekey_bytes(&ekey).unwrap(), inner);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(decrypt_ekey("!!not base64!!").is_err());
    }

    #[test]
    fn rejects_short_payload() {
        let ekey = BASE64.encode([1u8, 2, 3]);
        assert!(decrypt_ekey(&ekey).is_err());
    }

    #[test]
    fn rejects_unaligned_envelope() {
        // 8 clear bytes plus a 12-byte tail: not a whole number of blocks.
        let ekey = BASE64.encode([7u8; 20]);
        assert!(decrypt_ekey(&ekey).is_err());
    }
}
