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


//! RC4 key scheduling over an N-entry state
//!
//! The QMC2 RC4 variant runs the classic KSA/PRGA but with the S-box sized
//! to the key length, which routinely exceeds 256 entries. All indices are
//! reduced modulo N rather than 0xFF-masked.

pub struct Rc4 {
    state: Vec<u8>,
    i: usize,
    j: usize,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let n = key.len();
        let mut state: Vec<u8> = (0..n).map(|i| i as u8).collect();

        let mut j = 0usize;
        for i in 0..n {
            j = (j + state[i] as usize + key[i] as usize) % n;
            state.swap(i, j);
        }

        Rc4 { state, i: 0, j: 0 }
    }

    /// XOR the next keystream bytes into `buf`.
    ///
    /// Over a zeroed buffer this yields the raw PRGA output, which is how
    /// the QMC2 cipher derives its cached keystream.
    pub fn derive(&mut self, buf: &mut [u8]) {
        let n = self.state.len();
        for byte in buf.iter_mut() {
            self.i = (self.i + 1) % n;
            self.j = (self.j + self.state[self.i] as usize) % n;
            self.state.swap(self.i, self.j);
            let idx = (self.state[self.i] as usize + self.state[self.j] as usize) % n;
            *byte ^= self.state[idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_over_zeros_equals_raw_stream() {
        let key: Vec<u8> = (0..400u32).map(|i| (i * 13 + 7) as u8).collect();

        let mut a = vec![0u8; 64];
        Rc4::new(&key).derive(&mut a);

        // XOR-deriving into existing content layers the same stream on top.
        let mut b: Vec<u8> = (0..64u8).collect();
        Rc4::new(&key).derive(&mut b);
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x ^ (i as u8), *y);
        }
    }

    #[test]
    fn stream_is_deterministic_across_instances() {
        let key = vec![9u8; 301];
        let mut a = vec![0u8; 128];
        let mut b = vec![0u8; 128];
        Rc4::new(&key).derive(&mut a);
        Rc4::new(&key).derive(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn state_larger_than_256_entries() {
        // Keys longer than 256 bytes still schedule; state entries repeat
        // as u8 but the permutation indices cover the whole key length.
        let key: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let mut out = vec![0u8; 32];
        Rc4::new(&key).derive(&mut out);
        assert!(out.iter().any(|&b| b != 0));
    }
}
