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


//! Cryptographic primitives and stream ciphers
//!
//! Everything in here is decrypt-only: the pipeline never re-encrypts.
//! `aes_cbc`, `tea` and `rc4` are the block/stream building blocks;
//! `ekey` unwraps the per-song key envelope and `qmc2` holds the two
//! audio stream-cipher variants keyed by the unwrapped key.

pub mod aes_cbc;
pub mod ekey;
pub mod qmc2;
pub mod rc4;
pub mod tea;

pub use ekey::decrypt_ekey;
pub use qmc2::Qmc2Cipher;
